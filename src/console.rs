use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use log::debug;
use std::io::{self, BufRead, Write};

/// Operator interaction between acquisition steps.
pub trait Console {
    /// Blocks until the operator asks for the next measurement.
    fn wait_for_start(&mut self) -> io::Result<()>;
    /// Asks whether to run another cycle. `false` means quit and save.
    fn continue_or_quit(&mut self) -> io::Result<bool>;
    /// Shows the running record count during a TTTR acquisition.
    fn progress(&mut self, records: u64) -> io::Result<()>;
    fn finish_progress(&mut self) -> io::Result<()>;
}

/// Line-oriented prompts on any reader/writer pair.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<io::StdinLock<'static>, io::Stdout> {
    pub fn terminal() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Console for Prompt<R, W> {
    fn wait_for_start(&mut self) -> io::Result<()> {
        write!(self.output, "\npress RETURN to start measurement")?;
        self.output.flush()?;
        self.read_answer()?;
        Ok(())
    }

    fn continue_or_quit(&mut self) -> io::Result<bool> {
        write!(
            self.output,
            "\nEnter c to continue or q to quit and save the count data."
        )?;
        self.output.flush()?;
        // end of input quits as well, so a closed stdin cannot spin forever
        Ok(match self.read_answer()? {
            Some(answer) => !answer.starts_with('q'),
            None => false,
        })
    }

    fn progress(&mut self, records: u64) -> io::Result<()> {
        queue!(
            self.output,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(format!("Progress:{:>9}", records))
        )?;
        self.output.flush()
    }

    fn finish_progress(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        self.output.flush()
    }
}

/// Runs a fixed number of histogram cycles without asking anyone.
#[derive(Debug)]
pub struct Unattended {
    cycles: u32,
    done: u32,
}

impl Unattended {
    pub fn new(cycles: u32) -> Self {
        Self {
            cycles,
            done: 0,
        }
    }
}

impl Console for Unattended {
    fn wait_for_start(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn continue_or_quit(&mut self) -> io::Result<bool> {
        self.done += 1;
        Ok(self.done < self.cycles)
    }

    fn progress(&mut self, records: u64) -> io::Result<()> {
        debug!("Progress: {}", records);
        Ok(())
    }

    fn finish_progress(&mut self) -> io::Result<()> {
        Ok(())
    }
}
