use std::io::{self, BufRead, Write};

use canopy::move_session::{Conflict, ProgressUpdate};
use canopy::{ConflictResolver, Resolution};
use tracing::warn;

/// Asks the user about every conflict.
pub struct PromptResolver<R, W> {
    input: R,
    output: W,
}

impl PromptResolver<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, conflict: &Conflict) -> io::Result<Option<Resolution>> {
        loop {
            write!(self.output, "{} [r]eplace/[s]kip/[c]ancel: ", conflict.message)?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            match line.parse() {
                Ok(resolution) => return Ok(Some(resolution)),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> ConflictResolver for PromptResolver<R, W> {
    fn resolve(&mut self, conflict: &Conflict) -> Resolution {
        match self.ask(conflict) {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                warn!("Input closed, cancelling the move");
                Resolution::Cancel
            }
            Err(e) => {
                warn!("Failed to prompt for a resolution, cancelling the move: {e}");
                Resolution::Cancel
            }
        }
    }

    fn progress(&mut self, update: &ProgressUpdate) {
        if let Err(e) = writeln!(
            self.output,
            "[{:>3}%] {}/{} {}",
            update.percentage, update.current, update.total, update.node_name
        ) {
            warn!("Failed to print progress: {e}");
        }
    }
}
