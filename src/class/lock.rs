//! Advisory file locking for class databases.
//!
//! Writers serialize on a POSIX write lock; readers never lock. A zero
//! length covers the whole file, any other length covers just that byte
//! range (used for the classification counter bump).

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use std::fs::File;
        use std::io;
        use std::os::unix::io::AsRawFd;
        use std::thread;
        use std::time::Duration;

        const LOCK_ATTEMPTS: u32 = 20;
        const RETRY_DELAY: Duration = Duration::from_secs(1);

        fn setlk(file: &File, kind: libc::c_int, start: u64, len: u64) -> io::Result<()> {
            let mut fl: libc::flock = unsafe { std::mem::zeroed() };
            fl.l_type = kind as libc::c_short;
            fl.l_whence = libc::SEEK_SET as libc::c_short;
            fl.l_start = start as libc::off_t;
            fl.l_len = len as libc::off_t;
            let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &fl) };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }

        /// Takes a write lock, retrying once per second while another
        /// writer holds it.
        pub(crate) fn acquire(file: &File, start: u64, len: u64) -> io::Result<()> {
            let mut attempts = LOCK_ATTEMPTS;
            loop {
                match setlk(file, libc::F_WRLCK, start, len) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        let contended = matches!(
                            err.raw_os_error(),
                            Some(libc::EAGAIN) | Some(libc::EACCES)
                        );
                        if !contended || attempts <= 1 {
                            return Err(err);
                        }
                        attempts -= 1;
                        thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        pub(crate) fn release(file: &File, start: u64, len: u64) -> io::Result<()> {
            setlk(file, libc::F_UNLCK, start, len)
        }
    } else {
        use std::fs::File;
        use std::io;

        pub(crate) fn acquire(_file: &File, _start: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }

        pub(crate) fn release(_file: &File, _start: u64, _len: u64) -> io::Result<()> {
            Ok(())
        }
    }
}
