use rustyline::{error::ReadlineError, Editor};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum Error<E> {
    #[error(transparent)]
    Readline(ReadlineError),
    #[error("Eval failed: {0:?}")]
    EvalError(E),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flow {
    Continue,
    Quit,
}

pub trait Repl {
    type Error: std::fmt::Debug;
    const PROMPT: &'static str = ">> ";
    const CONTINUATION_PROMPT: &'static str = ".. ";
    const HISTORY: Option<&'static str> = None;
    fn evaluate(&mut self, input: String) -> Result<Flow, Self::Error>;
}

#[derive(Default, Debug)]
pub struct Pending {
    buffer: Option<String>,
}
impl Pending {
    pub fn is_continuing(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn feed(&mut self, mut line: String) -> Option<String> {
        if line.ends_with('\\') {
            line.pop();
            line.push('\n');
            match self.buffer.as_mut() {
                Some(buffer) => buffer.push_str(&line),
                None => self.buffer = Some(line),
            }
            return None;
        }
        Some(match self.buffer.take() {
            Some(mut buffer) => {
                buffer.push_str(&line);
                buffer
            }
            None => line,
        })
    }
}

pub fn start_repl<R: Repl>(mut repl: R) -> Result<(), Error<R::Error>> {
    let mut editor = Editor::<()>::new();
    if let Some(history) = R::HISTORY {
        if let Err(e) = editor.load_history(history) {
            debug!(history, "history not loaded: {e}");
        }
    }
    let mut pending = Pending::default();
    loop {
        let prompt = if pending.is_continuing() {
            R::CONTINUATION_PROMPT
        } else {
            R::PROMPT
        };
        match editor.readline(prompt) {
            Ok(line) => {
                let Some(input) = pending.feed(line) else {
                    continue;
                };
                editor.add_history_entry(input.as_str());
                let flow = repl.evaluate(input).map_err(Error::EvalError)?;
                if let Some(history) = R::HISTORY {
                    editor.save_history(history).map_err(Error::Readline)?;
                }
                if flow == Flow::Quit {
                    println!("Bye!");
                    break Ok(());
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!("Bye!");
                break Ok(());
            }
            Err(e) => break Err(Error::Readline(e)),
        }
    }
}
