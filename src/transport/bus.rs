use log::trace;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::serial::SerialLink;
use crate::utils::error::SolarError;

/// One physical serial line shared by every reader addressed on it.
///
/// Request/response framing on the bus can't tell concurrent callers apart,
/// so a whole write-then-read exchange runs under one lock hold.
#[derive(Clone)]
pub struct Transport {
    port_name: Arc<str>,
    link: Arc<Mutex<Box<dyn SerialLink>>>,
}

/// Exclusive hold on the bus, good for exactly one exchange.
pub struct TransportGuard<'a> {
    link: MutexGuard<'a, Box<dyn SerialLink>>,
}

impl Transport {
    pub fn new(link: impl SerialLink + 'static) -> Self {
        let port_name: Arc<str> = Arc::from(link.port_name());
        Self {
            port_name,
            link: Arc::new(Mutex::new(Box::new(link))),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Blocks until the bus is free. The lock is released when the guard drops.
    pub fn acquire(&self) -> TransportGuard<'_> {
        // A reader that panicked mid-exchange leaves the link usable; the next
        // exchange clears stale input before writing.
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        TransportGuard { link }
    }
}

impl TransportGuard<'_> {
    /// Writes `request` (skipped when empty) and reads up to `response_len` bytes.
    /// Opens the link first if it is closed.
    pub fn exchange(mut self, request: &[u8], response_len: usize) -> Result<Vec<u8>, SolarError> {
        if !self.link.is_open() {
            self.link.open()?;
        }

        if !request.is_empty() {
            let written = self.link.write(request)?;
            if written != request.len() {
                return Err(SolarError::CommunicationError(format!(
                    "Short write: {} of {} bytes",
                    written,
                    request.len()
                )));
            }
        }

        let response = self.link.read(response_len)?;
        trace!(
            "Exchange on {}: {} bytes out, {} bytes in",
            self.link.port_name(),
            request.len(),
            response.len()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryLink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Echoes the last written request back and flags overlapping exchanges.
    struct EchoLink {
        last: Vec<u8>,
        busy: Arc<AtomicBool>,
        overlaps: Arc<Mutex<u32>>,
        log: Arc<Mutex<Vec<(char, u8)>>>,
    }

    impl SerialLink for EchoLink {
        fn port_name(&self) -> &str {
            "echo"
        }
        fn is_open(&self) -> bool {
            true
        }
        fn open(&mut self) -> Result<(), SolarError> {
            Ok(())
        }
        fn write(&mut self, bytes: &[u8]) -> Result<usize, SolarError> {
            if self.busy.swap(true, Ordering::SeqCst) {
                *self.overlaps.lock().unwrap() += 1;
            }
            self.log.lock().unwrap().push(('w', bytes[0]));
            self.last = bytes.to_vec();
            thread::sleep(Duration::from_millis(2));
            Ok(bytes.len())
        }
        fn read(&mut self, _len: usize) -> Result<Vec<u8>, SolarError> {
            self.log.lock().unwrap().push(('r', self.last[0]));
            self.busy.store(false, Ordering::SeqCst);
            Ok(self.last.clone())
        }
    }

    #[test]
    fn exchanges_never_interleave() {
        let overlaps = Arc::new(Mutex::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = Transport::new(EchoLink {
            last: Vec::new(),
            busy: Arc::new(AtomicBool::new(false)),
            overlaps: overlaps.clone(),
            log: log.clone(),
        });

        let handles: Vec<_> = (1..=2u8)
            .map(|id| {
                let transport = transport.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let response = transport.acquire().exchange(&[id], 1).unwrap();
                        assert_eq!(response, vec![id]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*overlaps.lock().unwrap(), 0);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 80);
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, 'w');
            assert_eq!(pair[1], ('r', pair[0].1));
        }
    }

    #[test]
    fn opens_closed_link_once() {
        let link = MemoryLink::new();
        link.repeat_response(vec![1, 2, 3]);
        let transport = Transport::new(link.clone());

        assert_eq!(transport.acquire().exchange(b"x", 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(transport.acquire().exchange(b"y", 2).unwrap(), vec![1, 2]);
        assert_eq!(link.open_count(), 1);
        assert_eq!(link.writes(), vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn empty_request_only_reads() {
        let link = MemoryLink::new();
        link.push_response(vec![9; 4]);
        let transport = Transport::new(link.clone());

        assert_eq!(transport.acquire().exchange(&[], 4).unwrap(), vec![9; 4]);
        assert!(link.writes().is_empty());
        assert_eq!(link.read_count(), 1);
    }

    #[test]
    fn lock_released_after_panicking_holder() {
        let transport = Transport::new(MemoryLink::new());
        let cloned = transport.clone();
        let _ = thread::spawn(move || {
            let _guard = cloned.acquire();
            panic!("reader crashed");
        })
        .join();

        assert!(transport.acquire().exchange(&[], 0).is_ok());
    }
}
