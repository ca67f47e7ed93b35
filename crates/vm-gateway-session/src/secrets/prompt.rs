//! Secrets typed in by an operator.

use std::{
    io::{self, BufRead, BufReader, Stderr, Stdin, Write},
    sync::Mutex,
};

use vm_gateway_core::{SecretError, SecretStore, SecretString};

/// Asks for each secret on a writer and reads one line back.
///
/// Input is not masked; point it at a terminal with echo disabled, or use
/// it where shoulder-surfing is not a concern.
pub struct PromptSecretStore<R, W> {
    io: Mutex<(R, W)>,
}

impl PromptSecretStore<BufReader<Stdin>, Stderr> {
    /// Prompt on stderr, read from stdin.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R, W> PromptSecretStore<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    /// Prompt on `writer`, read from `reader`.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Recover the reader and writer.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn into_inner(self) -> Result<(R, W), SecretError> {
        self.io
            .into_inner()
            .map_err(|e| SecretError::Unavailable(e.to_string()))
    }
}

impl<R, W> SecretStore for PromptSecretStore<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn resolve(&self, name: &str, prompt: Option<&str>) -> Result<SecretString, SecretError> {
        let mut guard = self
            .io
            .lock()
            .map_err(|e| SecretError::Unavailable(e.to_string()))?;
        let (reader, writer) = &mut *guard;

        match prompt {
            Some(prompt) => write!(writer, "{prompt}")?,
            None => write!(writer, "Enter value for {name}: ")?,
        }
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(SecretError::NotFound(name.to_string()));
        }
        let value = line.trim_end_matches(['\r', '\n']).to_string();
        line.clear();
        Ok(SecretString::from(value))
    }
}
