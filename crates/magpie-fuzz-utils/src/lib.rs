//! Shared helpers for Magpie fuzz targets.
//!
//! Std-only on purpose: the fuzz workspace compiles in isolation and should
//! not drag the rest of the dependency graph with it.

use std::marker::PhantomData;
use std::str;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on the bytes a harness will look at from one fuzz input.
///
/// Caps allocation and quadratic blowups driven by attacker-controlled
/// lengths; `cargo fuzz` can still be run with a larger `-max_len`.
pub const MAX_INPUT_SIZE: usize = 256 * 1024;

/// Wall-clock budget per fuzz input.
pub const TIMEOUT: Duration = Duration::from_secs(1);

/// Returns a UTF-8 view of `data`, truncated to `MAX_INPUT_SIZE`.
///
/// If the cap lands inside a multibyte codepoint, up to three trailing
/// bytes are trimmed to recover; anything else non-UTF-8 is rejected.
#[inline]
pub fn truncate_utf8(data: &[u8]) -> Option<&str> {
    truncate_utf8_to(data, MAX_INPUT_SIZE)
}

/// [`truncate_utf8`] with a caller-chosen cap.
#[inline]
pub fn truncate_utf8_to(data: &[u8], max: usize) -> Option<&str> {
    let cap = data.len().min(max);
    for trim in 0..=3usize {
        let Some(end) = cap.checked_sub(trim) else {
            break;
        };
        if let Ok(text) = str::from_utf8(&data[..end]) {
            return Some(text);
        }
    }
    None
}

/// Runs each fuzz input on a worker thread under a wall-clock deadline.
///
/// libFuzzer only notices hangs at a coarse granularity, so the harness
/// enforces its own budget: the input is handed to a long-lived worker and
/// the calling thread panics if no answer arrives in time. State built by
/// `init` lives on the worker for the whole run, which keeps one-time
/// fixture setup (interned automata, registries) out of the per-input cost.
pub struct FuzzRunner<State> {
    name: &'static str,
    max_input_size: usize,
    timeout: Duration,
    inputs: mpsc::SyncSender<Vec<u8>>,
    done: Mutex<mpsc::Receiver<()>>,
    _state: PhantomData<fn() -> State>,
}

impl<State: 'static> FuzzRunner<State> {
    pub fn new_default(
        name: &'static str,
        init: fn() -> State,
        run_one: fn(&mut State, &[u8]),
    ) -> Self {
        Self::new(name, MAX_INPUT_SIZE, TIMEOUT, init, run_one)
    }

    pub fn new(
        name: &'static str,
        max_input_size: usize,
        timeout: Duration,
        init: fn() -> State,
        run_one: fn(&mut State, &[u8]),
    ) -> Self {
        // Capacity 1 so the caller can always hand over the next input and
        // then wait on the clock rather than on the worker.
        let (inputs, input_rx) = mpsc::sync_channel::<Vec<u8>>(1);
        let (done_tx, done) = mpsc::sync_channel::<()>(1);

        std::thread::spawn(move || {
            let mut state = init();
            for input in input_rx {
                run_one(&mut state, &input);
                let _ = done_tx.send(());
            }
        });

        FuzzRunner {
            name,
            max_input_size,
            timeout,
            inputs,
            done: Mutex::new(done),
            _state: PhantomData,
        }
    }

    pub fn run(&self, data: &[u8]) {
        let cap = data.len().min(self.max_input_size);
        let deadline = Instant::now() + self.timeout;

        let mut payload = data[..cap].to_vec();
        loop {
            match self.inputs.try_send(payload) {
                Ok(()) => break,
                Err(mpsc::TrySendError::Full(returned)) => {
                    payload = returned;
                    if Instant::now() >= deadline {
                        panic!("{} fuzz target timed out", self.name);
                    }
                    std::thread::yield_now();
                }
                Err(mpsc::TrySendError::Disconnected(_)) => {
                    panic!("{} worker thread exited", self.name);
                }
            }
        }

        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO);
        let received = self
            .done
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .recv_timeout(remaining);
        match received {
            Ok(()) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                panic!("{} fuzz target timed out", self.name)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                panic!("{} worker thread panicked", self.name)
            }
        }
    }
}
