//! The echo verification loop
//!
//! Walks the vector table in order: send, wait for the reply, check it
//! against the expected transformation (byte-reversed for datagram,
//! verbatim for stream). Repetition is an outer pass loop (flood and
//! forever modes) around an inner table scan; flood additionally skips
//! the reply wait.

use anyhow::Result;
use std::io::Write;

use crate::config::{MAX_PAYLOAD, REPLY_TIMEOUT};
use crate::probe::socket::{await_reply, Endpoint, Wait};
use crate::vectors::TestVector;

/// Loop modes, fixed for the whole run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Send back-to-back, never wait for replies
    pub flood: bool,
    /// Repeat the table after completing it
    pub forever: bool,
    /// Stop after this many passes over the table; `None` follows the
    /// mode (one pass, or unbounded for flood/forever). Harness knob,
    /// never set from the CLI.
    pub pass_limit: Option<u64>,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every vector verified
    Passed,
    /// Clean run, but the vector at this index never got its expected
    /// reply
    FirstTimeout(usize),
    /// Reply verification failed (or the readiness wait misfired) at
    /// this index
    Failed(usize),
}

impl Outcome {
    /// Process exit code for this outcome
    ///
    /// 0 for success, `index + 1` for a first timeout, the bare index
    /// for a verification failure. The two positive forms share one
    /// number space and a failure at index 0 reads as success; callers
    /// relying on exit codes get exactly this contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Passed => 0,
            Outcome::FirstTimeout(index) => *index as i32 + 1,
            Outcome::Failed(index) => *index as i32,
        }
    }
}

/// What one vector exchange decided
enum Step {
    /// Move on to the next vector
    Advance,
    /// Abort the run with this outcome
    Abort(Outcome),
}

/// The verification engine: owns the socket for its whole run
pub struct Verifier {
    endpoint: Endpoint,
    table: &'static [TestVector],
    options: RunOptions,
    first_timeout: Option<usize>,
}

impl Verifier {
    pub fn new(endpoint: Endpoint, table: &'static [TestVector], options: RunOptions) -> Self {
        Self {
            endpoint,
            table,
            options,
            first_timeout: None,
        }
    }

    /// Run the loop to completion
    pub fn run(mut self) -> Result<Outcome> {
        // Flood and forever repeat without bound; a plain run is one pass
        let unbounded = self.options.flood || self.options.forever;
        let pass_limit = self
            .options
            .pass_limit
            .or(if unbounded { None } else { Some(1) });

        let mut buf = [0u8; MAX_PAYLOAD];
        let mut passes: u64 = 0;

        loop {
            for (index, vector) in self.table.iter().enumerate() {
                match self.exchange(index, vector, &mut buf)? {
                    Step::Advance => {}
                    Step::Abort(outcome) => return Ok(outcome),
                }
            }

            passes += 1;
            if pass_limit.is_some_and(|limit| passes >= limit) {
                break;
            }
        }

        println!();

        Ok(match self.first_timeout {
            Some(index) => Outcome::FirstTimeout(index),
            None => Outcome::Passed,
        })
    }

    /// Resolve one vector: send, await, read, verify
    fn exchange(&mut self, index: usize, vector: &TestVector, buf: &mut [u8]) -> Result<Step> {
        self.endpoint.send_payload(vector.payload)?;

        if self.options.flood {
            return Ok(Step::Advance);
        }

        match await_reply(&self.endpoint, REPLY_TIMEOUT)? {
            Wait::TimedOut => {
                if vector.expect_reply {
                    eprintln!("Timeout while waiting idx {} len {}", index, vector.len());
                    if self.first_timeout.is_none() {
                        self.first_timeout = Some(index);
                    }
                }
                return Ok(Step::Advance);
            }
            Wait::Stray => {
                eprintln!("Invalid fd");
                return Ok(Step::Abort(Outcome::Failed(index)));
            }
            Wait::Ready => {}
        }

        let received = self.endpoint.recv_reply(buf, vector.len())?;
        let reply = &mut buf[..received];

        // A datagram echo comes back byte-reversed; undoing it here makes
        // a correct reply compare equal to the original payload. Stream
        // echoes are verbatim.
        if self.endpoint.is_datagram() {
            reply.reverse();
        }

        if *reply != *vector.payload {
            eprintln!("Check failed idx {} len {}", index, received);
            return Ok(Step::Abort(Outcome::Failed(index)));
        }

        print!(".");
        std::io::stdout().flush().ok();

        Ok(Step::Advance)
    }
}
