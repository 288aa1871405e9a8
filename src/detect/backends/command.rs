use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::recognizer::Recognizer;
use crate::error::RecognitionError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const EXIT_POLL: Duration = Duration::from_millis(20);

/// Captioning model run as a local subprocess.
///
/// The image is written to the child's stdin; the caption is read from its
/// stdout. A non-zero exit status is a recognition failure, and a child still
/// running at the deadline is killed.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Recognizer for CommandRecognizer {
    fn name(&self) -> &'static str {
        "command"
    }

    fn describe(&self, image: &[u8]) -> Result<String, RecognitionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RecognitionError::new(format!("spawn {}: {}", self.program, e)))?;

        // Pipes are serviced on their own threads so a chatty child cannot
        // block on a full buffer while we wait for it.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError::new("recognizer stdin unavailable"))?;
        let payload = image.to_vec();
        let writer = std::thread::spawn(move || {
            if let Err(e) = stdin.write_all(&payload) {
                log::debug!("recognizer closed stdin early: {}", e);
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_until_deadline(&mut child)?;
        // A detached writer is harmless once the child has exited.
        drop(writer);
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(RecognitionError::new(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }
        String::from_utf8(stdout)
            .map(|caption| caption.trim().to_string())
            .map_err(|_| RecognitionError::new("recognizer output is not valid UTF-8"))
    }
}

impl CommandRecognizer {
    fn wait_until_deadline(
        &self,
        child: &mut Child,
    ) -> Result<std::process::ExitStatus, RecognitionError> {
        let deadline = Instant::now().checked_add(self.timeout);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    return Err(RecognitionError::new(format!(
                        "wait for {}: {}",
                        self.program, e
                    )))
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                if let Err(e) = child.kill() {
                    log::warn!("failed to kill {}: {}", self.program, e);
                }
                let _ = child.wait();
                return Err(RecognitionError::new(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )));
            }
            std::thread::sleep(EXIT_POLL);
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut out = Vec::new();
            pipe.read_to_end(&mut out)?;
            Ok(out)
        })
    })
}

fn collect(
    reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
) -> Result<Vec<u8>, RecognitionError> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    match reader.join() {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(RecognitionError::new(format!("read recognizer output: {}", e))),
        Err(_) => Err(RecognitionError::new("recognizer output reader panicked")),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reads_caption_from_stdout() {
        let recognizer = CommandRecognizer::new(
            "sh",
            vec!["-c".into(), "cat > /dev/null; echo 'a cat on the porch'".into()],
        );
        assert_eq!(recognizer.describe(b"jpeg").unwrap(), "a cat on the porch");
    }

    #[test]
    fn non_zero_exit_is_reported() {
        let recognizer = CommandRecognizer::new(
            "sh",
            vec!["-c".into(), "cat > /dev/null; echo 'no model' >&2; exit 3".into()],
        );
        let err = recognizer.describe(b"jpeg").unwrap_err();
        assert!(err.cause.contains("no model"), "{}", err);
    }

    #[test]
    fn hung_child_is_killed_at_the_deadline() {
        let recognizer = CommandRecognizer::new(
            "sh",
            vec!["-c".into(), "cat > /dev/null; exec sleep 5".into()],
        )
        .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = recognizer.describe(b"jpeg").unwrap_err();

        assert!(err.cause.contains("timed out"), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn large_output_does_not_block_the_wait() {
        let recognizer = CommandRecognizer::new(
            "sh",
            vec!["-c".into(), "cat > /dev/null; head -c 200000 /dev/zero | tr '\\0' a; echo".into()],
        )
        .with_timeout(Duration::from_secs(10));
        assert_eq!(recognizer.describe(b"jpeg").unwrap().len(), 200_000);
    }

    #[test]
    fn missing_program_is_reported() {
        let recognizer = CommandRecognizer::new("/nonexistent/captioner", vec![]);
        assert!(recognizer.describe(b"jpeg").unwrap_err().cause.contains("spawn"));
    }
}
