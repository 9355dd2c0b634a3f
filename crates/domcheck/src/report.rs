use crate::config::ReportConfig;
use domcheck_broker::Verdict;
use std::io::{self, Write};

/// Tally of the results seen so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub valid: u64,
    pub invalid: u64,
    /// Results released after `--exit` tripped; not printed or counted.
    pub skipped: u64,
}

impl Summary {
    pub const fn total(&self) -> u64 {
        self.valid + self.invalid + self.skipped
    }
}

/// What the caller should do after a result has been reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    Continue,
    /// An invalid domain was found with `--exit`: stop submitting.
    Stop,
}

/// Prints results as they are released and keeps the [`Summary`].
pub struct Reporter<W> {
    config: ReportConfig,
    out: W,
    summary: Summary,
    tripped: bool,
}

impl<W: Write> Reporter<W> {
    pub const fn new(config: ReportConfig, out: W) -> Self {
        Self {
            config,
            out,
            summary: Summary {
                valid: 0,
                invalid: 0,
                skipped: 0,
            },
            tripped: false,
        }
    }

    pub fn report(&mut self, verdict: &Verdict<String>) -> io::Result<Next> {
        if self.tripped {
            self.summary.skipped += 1;
            return Ok(Next::Stop);
        }

        if verdict.valid {
            self.summary.valid += 1;
            if self.config.print_valid {
                writeln!(self.out, "{}", verdict.key)?;
            }
            return Ok(Next::Continue);
        }

        self.summary.invalid += 1;
        if self.config.print_invalid {
            writeln!(self.out, "{}", verdict.key)?;
        }
        if self.config.exit_on_invalid {
            self.tripped = true;
            return Ok(Next::Stop);
        }
        Ok(Next::Continue)
    }

    /// Whether the process should exit with a failure status.
    pub const fn failed(&self) -> bool {
        self.config.exit_on_invalid && self.summary.invalid > 0
    }

    pub fn finish(mut self) -> io::Result<Summary> {
        self.out.flush()?;
        Ok(self.summary)
    }
}
