use crate::{
    error::{Error, Result},
    identity_provider::DeviceCodeGrant,
};
use async_lock::Mutex;
use futures::{
    StreamExt,
    channel::mpsc::{UnboundedReceiver, unbounded},
};
use std::{
    fmt::{self, Debug},
    io::{self, Read, Write},
    sync::{Arc, OnceLock, mpsc},
    thread,
};

/// Shows sign-in instructions and waits until the operator says to continue.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait OperatorPrompt: Send + Sync + Debug {
    async fn confirm(&self, grant: &DeviceCodeGrant) -> Result<()>;
}

type Source = Box<dyn Read + Send>;

static STDIN: OnceLock<Arc<ConfirmationReader>> = OnceLock::new();

/// Reads one byte at a time from a blocking source on a dedicated thread.
///
/// The thread is started on first use and then serves every later request. A
/// read abandoned by a timed out or cancelled caller stays outstanding and its
/// byte goes to the next caller, so no read is ever issued twice.
struct ConfirmationReader {
    state: Mutex<ReaderState>,
}

struct ReaderState {
    source: Option<Source>,
    requests: Option<mpsc::Sender<()>>,
    replies: Option<UnboundedReceiver<io::Result<usize>>>,
    outstanding: bool,
}

impl ConfirmationReader {
    fn new(source: Source) -> Self {
        Self {
            state: Mutex::new(ReaderState {
                source: Some(source),
                requests: None,
                replies: None,
                outstanding: false,
            }),
        }
    }

    async fn read_byte(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(source) = state.source.take() {
            let (requests, replies) = spawn_reader(source)
                .map_err(|e| Error::Interrupted(format!("unable to wait for the operator: {e}")))?;
            state.requests = Some(requests);
            state.replies = Some(replies);
        }

        if !state.outstanding {
            let sent = state
                .requests
                .as_ref()
                .is_some_and(|requests| requests.send(()).is_ok());
            if !sent {
                return Err(Error::Interrupted("console reader went away".to_owned()));
            }
            state.outstanding = true;
        }

        let Some(replies) = state.replies.as_mut() else {
            return Err(Error::Interrupted("console reader went away".to_owned()));
        };
        let reply = replies.next().await;
        state.outstanding = false;
        match reply {
            Some(Ok(0)) => Err(Error::Interrupted("console input closed".to_owned())),
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(Error::Interrupted(format!("console read failed: {e}"))),
            None => Err(Error::Interrupted("console reader went away".to_owned())),
        }
    }
}

fn spawn_reader(
    mut source: Source,
) -> io::Result<(mpsc::Sender<()>, UnboundedReceiver<io::Result<usize>>)> {
    let (requests, pending) = mpsc::channel::<()>();
    let (replies_tx, replies) = unbounded();
    thread::Builder::new()
        .name("device-code-confirm".to_owned())
        .spawn(move || {
            while pending.recv().is_ok() {
                let mut byte = [0_u8; 1];
                if replies_tx.unbounded_send(source.read(&mut byte)).is_err() {
                    break;
                }
            }
        })?;
    Ok((requests, replies))
}

/// Prints the instructions to stdout and waits for one byte on stdin.
///
/// Every console prompt in the process shares one stdin reader.
#[derive(Clone)]
pub struct ConsolePrompt {
    reader: Arc<ConfirmationReader>,
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        let reader = STDIN.get_or_init(|| Arc::new(ConfirmationReader::new(Box::new(io::stdin()))));
        Self {
            reader: Arc::clone(reader),
        }
    }
}

impl ConsolePrompt {
    /// Wait for input on `source` instead of stdin.
    #[must_use]
    pub fn with_reader<R>(source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            reader: Arc::new(ConfirmationReader::new(Box::new(source))),
        }
    }
}

impl Debug for ConsolePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsolePrompt").finish_non_exhaustive()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl OperatorPrompt for ConsolePrompt {
    async fn confirm(&self, grant: &DeviceCodeGrant) -> Result<()> {
        print_instructions(grant)
            .map_err(|e| Error::Interrupted(format!("unable to write to the console: {e}")))?;
        self.reader.read_byte().await
    }
}

fn print_instructions(grant: &DeviceCodeGrant) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", "#".repeat(63))?;
    writeln!(stdout, "To continue, please do the following:")?;
    writeln!(stdout, "{}", grant.message)?;
    writeln!(
        stdout,
        "Press any key here when you return from entering your credentials."
    )?;
    stdout.flush()
}

/// Continues immediately, relying on token polling alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfirmation;

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl OperatorPrompt for NoConfirmation {
    async fn confirm(&self, _grant: &DeviceCodeGrant) -> Result<()> {
        Ok(())
    }
}
