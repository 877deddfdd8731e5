use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use crate::error::StoreError;

const GPG_ENV: &str = "PASSWORD_STORE_GPG";
const DEFAULT_GPG: &str = "gpg";
const GPG_OPTS: [&str; 4] = ["--quiet", "--yes", "--compress-algo=none", "--no-encrypt-to"];

/// Encrypts entries for a set of recipients and decrypts them again.
pub trait Cipher {
    fn encrypt(&self, recipients: &[String], plaintext: &[u8]) -> Result<Vec<u8>, StoreError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StoreError>;
}

/// Shells out to GnuPG, the same way `pass` itself does.
#[derive(Debug, Clone)]
pub struct Gpg {
    binary: String,
}

impl Gpg {
    pub fn from_env() -> Self {
        let binary = std::env::var(GPG_ENV)
            .ok()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GPG.to_string());
        Self { binary }
    }

    fn run(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>, StoreError> {
        debug!(gpg = %self.binary, ?args, "invoking gpg");
        let mut child = Command::new(&self.binary)
            .args(GPG_OPTS)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StoreError::Crypto(format!("failed to launch {}: {e}", self.binary)))?;

        // gpg may fill its output pipes before it has read all of stdin
        let stdin = child.stdin.take();
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        let output = output?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(StoreError::Crypto(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }
        match written {
            Ok(Ok(())) => Ok(output.stdout),
            Ok(Err(e)) => Err(StoreError::Crypto(format!(
                "could not feed {}: {e} {}",
                self.binary,
                stderr.trim()
            ))),
            Err(_) => Err(StoreError::Crypto(format!("writer for {} panicked", self.binary))),
        }
    }
}

impl Cipher for Gpg {
    fn encrypt(&self, recipients: &[String], plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        if recipients.is_empty() {
            return Err(StoreError::Crypto("no recipients in .gpg-id".into()));
        }
        let mut args = vec!["--encrypt"];
        for recipient in recipients {
            args.push("-r");
            args.push(recipient.as_str());
        }
        self.run(&args, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.run(&["--decrypt"], ciphertext)
    }
}

/// Stores content as-is; lets store tests run without a keyring.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct PlainCipher;

#[cfg(test)]
impl Cipher for PlainCipher {
    fn encrypt(&self, recipients: &[String], plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        if recipients.is_empty() {
            return Err(StoreError::Crypto("no recipients in .gpg-id".into()));
        }
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StoreError> {
        Ok(ciphertext.to_vec())
    }
}
