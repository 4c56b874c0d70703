//! C3: MemSink reader. Attaches to a POSIX shared-memory frame sink and
//! waits for new H.264 access units under an advisory `flock` protocol.
//!
//! Grounded on `janus/src/memsinkfd.c`'s `us_memsink_fd_wait_frame` /
//! `us_memsink_fd_get_frame` pair — the simpler, semaphore-free variant
//! (as opposed to `src/libs/memsink/memsink.c`'s server/client handshake),
//! which matches this crate's single-reader contract.

pub mod shared;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};

use crate::error::MemsinkError;
use crate::frame::{Frame, FOURCC_H264};
use crate::util::monotonic_now;
use shared::{capacity_for_name, Header, HEADER_SIZE};

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct MemSinkReader {
    name: String,
    capacity: usize,
    file: Option<File>,
    mmap: Option<MmapMut>,
    last_id: u64,
}

impl MemSinkReader {
    pub fn new(name: impl Into<String>) -> Result<Self, MemsinkError> {
        let name = name.into();
        let capacity = capacity_for_name(&name)?;
        Ok(Self {
            name,
            capacity,
            file: None,
            mmap: None,
            last_id: 0,
        })
    }

    pub fn is_attached(&self) -> bool {
        self.mmap.is_some()
    }

    /// Opens and memory-maps the shared-memory object. Any failure here is
    /// fatal for the current attach cycle; the caller should back off and
    /// retry (§4.1 failure model).
    pub fn attach(&mut self) -> Result<(), MemsinkError> {
        let path = format!("/dev/shm/{}", self.name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let region_size = HEADER_SIZE + self.capacity;
        let mmap = unsafe { MmapOptions::new().len(region_size).map_mut(&file)? };
        self.file = Some(file);
        self.mmap = Some(mmap);
        Ok(())
    }

    pub fn detach(&mut self) {
        self.mmap = None;
        self.file = None;
    }

    fn header(&self) -> &Header {
        let mmap = self.mmap.as_ref().expect("reader not attached");
        unsafe { &*(mmap.as_ptr() as *const Header) }
    }

    fn header_mut(&mut self) -> &mut Header {
        let mmap = self.mmap.as_mut().expect("reader not attached");
        unsafe { &mut *(mmap.as_mut_ptr() as *mut Header) }
    }

    fn data(&self) -> &[u8] {
        let mmap = self.mmap.as_ref().expect("reader not attached");
        &mmap[HEADER_SIZE..]
    }

    fn unlock(&self) {
        let fd = self.file.as_ref().expect("reader not attached").as_raw_fd();
        let _ = flock(fd, FlockArg::Unlock);
    }

    /// Blocks (via lock-acquire polling, not a sleeping condvar) until a new
    /// frame id is observed or `wait_timeout` elapses. On success the
    /// advisory lock is held on return and the caller must follow up with
    /// `get_frame`, which releases it.
    pub fn wait_frame(&mut self) -> Result<(), MemsinkError> {
        self.wait_frame_with(DEFAULT_WAIT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    pub fn wait_frame_with(
        &mut self,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), MemsinkError> {
        if self.file.is_none() {
            return Err(MemsinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "memsink not attached",
            )));
        }
        let deadline = Instant::now() + wait_timeout;
        loop {
            let fd = self.file.as_ref().unwrap().as_raw_fd();
            match flock(fd, FlockArg::LockExclusiveNonblock) {
                Ok(()) => match self.header().check_magic_and_version() {
                    Ok(()) => {
                        if self.header().id != self.last_id {
                            return Ok(());
                        }
                        self.unlock();
                    }
                    Err(e) => {
                        self.unlock();
                        return Err(e);
                    }
                },
                Err(Errno::EWOULDBLOCK) => {}
                Err(errno) => return Err(MemsinkError::Lock(std::io::Error::from(errno))),
            }
            if Instant::now() >= deadline {
                return Err(MemsinkError::NoData);
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Copies the current frame out of shared memory. Assumes the lock is
    /// held (i.e. called right after `wait_frame` returned `Ok`); always
    /// releases the lock before returning, even on error.
    pub fn get_frame(&mut self, frame: &mut Frame, key_required: bool) -> Result<u64, MemsinkError> {
        let format = self.header().format;
        if format != FOURCC_H264 {
            self.unlock();
            return Err(MemsinkError::NotH264(format));
        }

        let id = self.header().id;
        let used = self.header().used as usize;
        let used = used.min(self.capacity);
        let copied = self.data()[..used].to_vec();

        {
            let header = self.header();
            frame.width = header.width;
            frame.height = header.height;
            frame.format = header.format;
            frame.stride = header.stride;
            frame.online = header.online != 0;
            frame.key = header.key != 0;
            frame.gop = header.gop;
            frame.grab_ts = header.grab_ts;
            frame.encode_begin_ts = header.encode_begin_ts;
            frame.encode_end_ts = header.encode_end_ts;
        }
        frame.set_data(&copied);

        let now = monotonic_now();
        let header = self.header_mut();
        header.last_client_ts = now;
        if key_required {
            header.key_requested = 1;
        }

        self.last_id = id;
        self.unlock();
        Ok(id)
    }
}
