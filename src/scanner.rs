//! Boyer–Moore scan for the `CRLFCRLF` header terminator.

use std::io::Read;

use log::trace;

use crate::error::PollError;
use crate::stream::PipelineStream;

/// The 4-byte terminator this scanner searches for: `CR LF CR LF`.
const TOKEN: [u8; 4] = *b"\r\n\r\n";

/// Bytes read from the stream per scan attempt, before re-checking availability.
const READ_CHUNK: usize = 512;

/// Amount the header buffer grows by at a time.
const GROWTH_STEP: usize = 512;

/// Bad-character shift table for [`TOKEN`].
///
/// Every byte value shifts by the full token length (4) by default, except the two bytes
/// the token is built from: `delta[CR] = 0` and `delta[LF] = 1`. These two exceptions are
/// the complete bad-character rule for this token — fully determined by `TOKEN` alone, so a
/// unit test can rebuild the table independently and compare.
fn build_shift_table() -> [usize; 256] {
    let mut table = [TOKEN.len(); 256];
    table[b'\r' as usize] = 0;
    table[b'\n' as usize] = 1;
    table
}

/// Outcome of one [`HeaderScanner::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The terminator was found; [`HeaderScanner::header`] now returns the complete header.
    Found,
    /// No terminator yet, and no more bytes are immediately available.
    Pending {
        /// Whether this call consumed any bytes before the stream ran dry. A poller uses
        /// this to distinguish a truly empty poll from one that made forward progress but
        /// didn't complete the header yet.
        progressed: bool,
    },
}

/// Accumulates bytes from a [`PipelineStream`] and searches them for `CRLFCRLF` using a
/// Boyer–Moore scan with the bad-character rule of [`build_shift_table`].
///
/// The scan cursor (`off`) and the accumulated byte count (`count`) persist across calls to
/// [`HeaderScanner::poll`], so a header spanning many non-blocking reads resumes exactly
/// where the previous call left off rather than re-scanning from the start.
#[derive(Debug)]
pub struct HeaderScanner {
    buf: Vec<u8>,
    count: usize,
    off: usize,
    shift: [usize; 256],
}

impl Default for HeaderScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderScanner {
    /// Creates a scanner with an empty buffer and the scan cursor at the token length — the
    /// earliest position a 4-byte match could end.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            count: 0,
            off: TOKEN.len(),
            shift: build_shift_table(),
        }
    }

    /// Performs one non-blocking scan step against `stream`.
    ///
    /// Reads everything immediately available (in chunks of up to [`READ_CHUNK`] bytes) and
    /// searches for the terminator after each chunk. On a match, the bytes following the
    /// terminator are pushed back onto `stream` and `Ok(ScanOutcome::Found)` is returned;
    /// [`HeaderScanner::header`] then exposes exactly the header bytes, up to and including
    /// the terminator. If the stream runs dry before a match, returns
    /// `Ok(ScanOutcome::Pending { progressed })`, where `progressed` reports whether any
    /// bytes were read this call even though the header isn't complete yet.
    pub fn poll(&mut self, stream: &mut PipelineStream, limit: usize) -> Result<ScanOutcome, PollError> {
        let mut progressed = false;
        loop {
            let available = stream.available()?;
            if available == 0 {
                return Ok(ScanOutcome::Pending { progressed });
            }

            let to_read = available.min(READ_CHUNK);
            self.ensure_capacity(self.count + to_read, limit)?;

            let n = stream.read(&mut self.buf[self.count..self.count + to_read])?;
            if n == 0 {
                return Err(PollError::PeerClosed);
            }
            self.count += n;
            progressed = true;
            trace!("header scan buffer now holds {} bytes", self.count);

            if let Some(header_end) = self.scan() {
                let trailing = &self.buf[header_end..self.count];
                if !trailing.is_empty() {
                    let tail = trailing.to_vec();
                    stream.push_back(&tail);
                }
                self.count = header_end;
                return Ok(ScanOutcome::Found);
            }
        }
    }

    /// The header bytes consumed on [`ScanOutcome::Found`], ending exactly with the
    /// terminator.
    pub fn header(&self) -> &[u8] {
        &self.buf[..self.count]
    }

    fn ensure_capacity(&mut self, needed: usize, limit: usize) -> Result<(), PollError> {
        if needed > limit {
            return Err(PollError::HeaderTooLong { limit });
        }
        if self.buf.len() < needed {
            let grown = (self.buf.len() + GROWTH_STEP).max(needed).min(limit);
            trace!("growing header buffer from {} to {grown} bytes", self.buf.len());
            self.buf.resize(grown, 0);
        }
        Ok(())
    }

    /// Scans `buf[0..count]` from `off` forward for the terminator, using the
    /// bad-character shift table on mismatch.
    ///
    /// Each attempt checks whether the 4 bytes ending at `off` equal [`TOKEN`]; on a
    /// mismatch the shift is keyed on `buf[off - 1]` — the rightmost byte of the
    /// attempted window — per the bad-character rule, so a run of non-CR/LF bytes is
    /// skipped 4 at a time.
    fn scan(&mut self) -> Option<usize> {
        let (found, new_off) = scan_for_token(&self.buf[..self.count], self.off, &self.shift);
        self.off = new_off;
        found
    }
}

/// Scans `buf` for [`TOKEN`] starting at `off`, returning the match end position (if any)
/// and the cursor position the scan stopped at — resumable across calls the same way
/// [`HeaderScanner::poll`] resumes across non-blocking reads.
///
/// Factored out of [`HeaderScanner::scan`] so [`find_terminator`] can drive the same search
/// over a plain byte slice, without a live socket, for fuzzing and benchmarking.
fn scan_for_token(buf: &[u8], mut off: usize, shift: &[usize; 256]) -> (Option<usize>, usize) {
    let token_len = TOKEN.len();
    while off <= buf.len() {
        let window = &buf[off - token_len..off];
        if window == TOKEN {
            return (Some(off), off);
        }
        let bad_char = buf[off - 1];
        // `delta[CR] = 0` per the bad-character rule, but a zero shift never advances `off`;
        // a run of bare CRs with no matching terminator would spin here forever. Always
        // advance by at least one byte.
        off += shift[bad_char as usize].max(1);
    }
    (None, off)
}

/// Finds the first occurrence of `CRLFCRLF` in `buf`, scanning the whole buffer in one call.
///
/// A thin, allocation-free entry point for fuzzing and benchmarking the bad-character scan
/// in isolation from the non-blocking read loop in [`HeaderScanner::poll`].
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    let shift = build_shift_table();
    scan_for_token(buf, TOKEN.len(), &shift).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn shift_table_matches_bad_character_rule() {
        let table = build_shift_table();
        for (byte, &shift) in table.iter().enumerate() {
            match byte as u8 {
                b'\r' => assert_eq!(shift, 0),
                b'\n' => assert_eq!(shift, 1),
                _ => assert_eq!(shift, 4),
            }
        }
    }

    #[test]
    fn finds_terminator_in_single_read() {
        let (server, mut client) = loopback_pair();
        let mut stream = PipelineStream::new(server);
        let mut scanner = HeaderScanner::new();

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        use std::io::Write;

        let mut outcome = ScanOutcome::Pending { progressed: false };
        for _ in 0..50 {
            outcome = scanner.poll(&mut stream, 8192).unwrap();
            if outcome == ScanOutcome::Found {
                break;
            }
        }
        assert_eq!(outcome, ScanOutcome::Found);
        assert_eq!(scanner.header(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn resumes_across_a_split_terminator() {
        use std::io::Write;
        let (server, mut client) = loopback_pair();
        let mut stream = PipelineStream::new(server);
        let mut scanner = HeaderScanner::new();

        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();

        let mut outcome = ScanOutcome::Pending { progressed: false };
        for _ in 0..50 {
            outcome = scanner.poll(&mut stream, 8192).unwrap();
            if outcome != (ScanOutcome::Pending { progressed: false }) {
                break;
            }
        }
        assert!(matches!(outcome, ScanOutcome::Pending { progressed: true }));

        client.write_all(b"\r\n").unwrap();
        for _ in 0..50 {
            outcome = scanner.poll(&mut stream, 8192).unwrap();
            if outcome == ScanOutcome::Found {
                break;
            }
        }
        assert_eq!(outcome, ScanOutcome::Found);
        assert_eq!(scanner.header(), b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn pushes_back_bytes_past_the_terminator() {
        use std::io::Write;
        let (server, mut client) = loopback_pair();
        let mut stream = PipelineStream::new(server);
        let mut scanner = HeaderScanner::new();

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET /a HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();

        let mut outcome = ScanOutcome::Pending { progressed: false };
        for _ in 0..50 {
            outcome = scanner.poll(&mut stream, 8192).unwrap();
            if outcome == ScanOutcome::Found {
                break;
            }
        }
        assert_eq!(outcome, ScanOutcome::Found);

        let mut leftover = [0u8; 28];
        let n = stream.read(&mut leftover).unwrap();
        assert_eq!(&leftover[..n], b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn a_run_of_bare_cr_bytes_does_not_hang_find_terminator() {
        // `delta[CR] = 0` in the shift table; without a forward-progress floor this would
        // spin forever instead of returning.
        let junk = vec![b'\r'; 4096];
        assert_eq!(find_terminator(&junk), None);
    }

    #[test]
    fn a_run_of_bare_cr_bytes_does_not_hang_poll() {
        use std::io::Write;
        let (server, mut client) = loopback_pair();
        let mut stream = PipelineStream::new(server);
        let mut scanner = HeaderScanner::new();

        client.write_all(&vec![b'\r'; 8193]).unwrap();

        let mut result = Ok(ScanOutcome::Pending { progressed: false });
        for _ in 0..50 {
            result = scanner.poll(&mut stream, 8192);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(PollError::HeaderTooLong { limit: 8192 })));
    }

    #[test]
    fn oversize_header_fails_without_terminator() {
        use std::io::Write;
        let (server, mut client) = loopback_pair();
        let mut stream = PipelineStream::new(server);
        let mut scanner = HeaderScanner::new();

        let junk = vec![b'x'; 8193];
        client.write_all(&junk).unwrap();

        let mut result = Ok(ScanOutcome::Pending { progressed: false });
        for _ in 0..50 {
            result = scanner.poll(&mut stream, 8192);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(PollError::HeaderTooLong { limit: 8192 })));
    }
}
