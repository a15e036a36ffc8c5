use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Another launcher holds the guard. `pid` is its process id when the
    /// holder recorded one.
    #[error("another OhTanks launcher is already running")]
    AlreadyRunning { pid: Option<u32> },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[cfg(windows)]
    #[error("win32 call {api} failed with code {code}")]
    Win32 { api: &'static str, code: u32 },
}

/// Process id recorded in `lock_file` by the current holder, if readable.
pub fn holder_pid(lock_file: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_file)
        .ok()
        .and_then(|contents| contents.trim().parse().ok())
}

#[cfg(windows)]
mod windows_impl {
    use std::path::Path;
    use std::ptr;

    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
    use windows_sys::Win32::System::Threading::CreateMutexA;

    use super::{AcquireError, holder_pid};

    const MUTEX_NAME: &[u8] = b"Local\\OhTanksLauncher\0";

    /// Owns a named mutex for the lifetime of the launcher.
    pub struct SingleInstance {
        handle: HANDLE,
    }

    impl SingleInstance {
        pub fn acquire(lock_file: &Path) -> Result<Self, AcquireError> {
            // SAFETY: the name is a static NUL-terminated string and the
            // security attributes pointer may be null.
            let handle = unsafe { CreateMutexA(ptr::null(), 1, MUTEX_NAME.as_ptr()) };
            // SAFETY: reads the calling thread's last-error value.
            let last_error = unsafe { GetLastError() };
            if handle.is_null() {
                return Err(AcquireError::Win32 {
                    api: "CreateMutexA",
                    code: last_error,
                });
            }
            if last_error == ERROR_ALREADY_EXISTS {
                // SAFETY: `handle` is a valid handle we own.
                unsafe { CloseHandle(handle) };
                return Err(AcquireError::AlreadyRunning {
                    pid: holder_pid(lock_file),
                });
            }

            if let Err(error) = std::fs::write(lock_file, format!("{}\n", std::process::id())) {
                log::warn!("Failed to record launcher pid in {}: {error}", lock_file.display());
            }
            Ok(Self { handle })
        }
    }

    impl Drop for SingleInstance {
        fn drop(&mut self) {
            // SAFETY: `self.handle` came from `CreateMutexA` and is closed
            // exactly once.
            unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(not(windows))]
mod lock_file_impl {
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::path::Path;

    use fs2::FileExt;

    use super::{AcquireError, holder_pid};

    /// Exclusive advisory lock on the instance file, released when dropped
    /// or when the process dies.
    pub struct SingleInstance {
        _file: File,
    }

    impl SingleInstance {
        pub fn acquire(lock_file: &Path) -> Result<Self, AcquireError> {
            let io = |context| move |source| AcquireError::Io { context, source };

            if let Some(parent) = lock_file.parent() {
                std::fs::create_dir_all(parent).map_err(io("failed to create data directory"))?;
            }
            // Not truncated on open: a running holder's pid must stay readable.
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(lock_file)
                .map_err(io("failed to open instance lock file"))?;

            if let Err(error) = file.try_lock_exclusive() {
                return if error.kind() == std::io::ErrorKind::WouldBlock {
                    Err(AcquireError::AlreadyRunning {
                        pid: holder_pid(lock_file),
                    })
                } else {
                    Err(io("failed to lock instance file")(error))
                };
            }

            file.set_len(0)
                .and_then(|()| write!(file, "{}", std::process::id()))
                .and_then(|()| file.flush())
                .map_err(io("failed to record launcher pid"))?;
            Ok(Self { _file: file })
        }
    }
}

#[cfg(not(windows))]
pub use lock_file_impl::SingleInstance;
#[cfg(windows)]
pub use windows_impl::SingleInstance;

#[cfg(all(test, not(windows)))]
mod tests {
    use super::{AcquireError, SingleInstance, holder_pid};

    #[test]
    fn holder_records_its_pid() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_file = temp_dir.path().join("data").join("instance.lock");

        let _instance = SingleInstance::acquire(&lock_file).expect("lock should be acquired");

        assert_eq!(holder_pid(&lock_file), Some(std::process::id()));
    }

    #[test]
    fn second_launcher_sees_the_holder_pid() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_file = temp_dir.path().join("instance.lock");

        let first = SingleInstance::acquire(&lock_file).expect("lock should be acquired");
        let second = SingleInstance::acquire(&lock_file);
        assert!(matches!(
            second,
            Err(AcquireError::AlreadyRunning { pid: Some(pid) }) if pid == std::process::id()
        ));

        drop(first);
        assert!(SingleInstance::acquire(&lock_file).is_ok());
    }

    #[test]
    fn stale_or_garbled_lock_file_has_no_holder() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let lock_file = temp_dir.path().join("instance.lock");
        assert_eq!(holder_pid(&lock_file), None);

        std::fs::write(&lock_file, "not a pid").expect("lock file should be written");
        assert_eq!(holder_pid(&lock_file), None);

        std::fs::write(&lock_file, "999999999999").expect("lock file should be written");
        let _instance = SingleInstance::acquire(&lock_file).expect("stale file should not block");
        assert_eq!(holder_pid(&lock_file), Some(std::process::id()));
    }
}
