//! Single-threaded discrete-event scheduler owning the virtual clock.
//!
//! Processes run cooperatively: a process is resumed at its wake-up time,
//! runs until it returns a [`Yield`], and is then either suspended for a
//! fixed delay or terminated. Wake-ups are ordered by time; wake-ups at the
//! same time run in the order the processes were spawned.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::bus::Bus;
use crate::error::{Error, Result};

/// What a process asks for when it gives control back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Yield {
    /// Suspend for the given number of seconds of virtual time.
    Timeout(f64),
    /// Never run again.
    Terminate,
}

/// Lifecycle of a scheduled process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessState {
    /// Scheduled to run at the current virtual time.
    Ready,
    /// Currently executing.
    Running,
    /// Waiting for the virtual clock to reach `until`.
    Suspended {
        /// Wake-up time in seconds.
        until: f64,
    },
    /// Finished; will not be resumed.
    Terminated,
}

/// What a process sees while it runs.
pub struct Context<'a> {
    /// Current virtual time in seconds.
    pub now: f64,
    /// The bus of the simulation.
    pub bus: &'a Bus,
}

/// A cooperatively scheduled process.
pub trait Process {
    /// Run until the next suspension point.
    ///
    /// # Errors
    ///
    /// Any error aborts [`Core::run`].
    fn resume(&mut self, ctx: &Context<'_>) -> Result<Yield>;
}

/// A [`Process`] backed by a closure, see [`from_fn`].
pub struct FromFn<F>(F);

/// Wrap a closure into a [`Process`].
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&Context<'_>) -> Result<Yield>,
{
    FromFn(f)
}

impl<F> Process for FromFn<F>
where
    F: FnMut(&Context<'_>) -> Result<Yield>,
{
    fn resume(&mut self, ctx: &Context<'_>) -> Result<Yield> {
        (self.0)(ctx)
    }
}

/// Identifies a process spawned on a [`Core`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(usize);

#[derive(Debug, Clone, Copy)]
struct Wakeup {
    time: f64,
    pid: usize,
}

impl PartialEq for Wakeup {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Wakeup {}

impl PartialOrd for Wakeup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wakeup {
    // reversed so that the max-heap pops the earliest wake-up first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.pid.cmp(&self.pid))
    }
}

struct Slot {
    process: Box<dyn Process>,
    state: ProcessState,
}

/// Virtual clock, process queue and message bus of one simulation run.
///
/// ```
/// use attitude_bank::scheduler::{from_fn, Core, Yield};
///
/// # fn main() -> attitude_bank::Result<()> {
/// let mut core = Core::new();
/// let mut ticks = 0;
/// core.spawn(from_fn(move |ctx| {
///     ticks += 1;
///     println!("tick {ticks} at {}", ctx.now);
///     Ok(Yield::Timeout(0.5))
/// }));
/// core.run(2.0)?;
/// assert!((core.now() - 2.0).abs() < 1e-12);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Core {
    now: f64,
    bus: Bus,
    queue: BinaryHeap<Wakeup>,
    slots: Vec<Slot>,
}

impl Core {
    /// Create a core with the clock at zero and an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// The bus shared by all components of this run.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Schedule a process to start at the current virtual time.
    pub fn spawn<P: Process + 'static>(&mut self, process: P) -> ProcessId {
        let pid = self.slots.len();
        self.slots.push(Slot {
            process: Box::new(process),
            state: ProcessState::Ready,
        });
        self.queue.push(Wakeup {
            time: self.now,
            pid,
        });
        log::debug!("spawned process {pid} at t = {}", self.now);
        ProcessId(pid)
    }

    /// Lifecycle state of a spawned process.
    #[must_use]
    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        self.slots.get(id.0).map(|slot| slot.state)
    }

    /// Run every wake-up scheduled strictly before `until`, then advance the
    /// clock to `until`.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by a process (including errors
    /// raised by subscribers of its publications), or if a process requests
    /// a negative or non-finite timeout. The failing process is terminated.
    pub fn run(&mut self, until: f64) -> Result<()> {
        while let Some(next) = self.queue.peek().copied() {
            if next.time >= until {
                break;
            }
            self.queue.pop();
            self.now = next.time;

            let slot = &mut self.slots[next.pid];
            slot.state = ProcessState::Running;
            let ctx = Context {
                now: self.now,
                bus: &self.bus,
            };
            let request = match slot.process.resume(&ctx) {
                Ok(request) => request,
                Err(err) => {
                    slot.state = ProcessState::Terminated;
                    return Err(err);
                }
            };
            match request {
                Yield::Timeout(delay) if delay >= 0.0 && delay.is_finite() => {
                    let until = self.now + delay;
                    slot.state = ProcessState::Suspended { until };
                    self.queue.push(Wakeup {
                        time: until,
                        pid: next.pid,
                    });
                }
                Yield::Timeout(delay) => {
                    slot.state = ProcessState::Terminated;
                    return Err(Error::InvalidTimeout {
                        delay,
                        time: self.now,
                    });
                }
                Yield::Terminate => slot.state = ProcessState::Terminated,
            }
        }
        self.now = self.now.max(until);
        Ok(())
    }
}
