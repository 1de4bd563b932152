//! Interactive console: writes nodes into the shared tree and shows what
//! arrives from peers.

use crate::command::{self, Action, Command, HELP};
use arbor_codec::{FrameWriter, Format, to_xml};
use arbor_core::{Node, Pattern};
use arbor_store::{LocalStore, Origin};
use color_eyre::eyre::{Result, WrapErr, eyre};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Deepest `e` nesting accepted
const MAX_SCRIPT_DEPTH: usize = 8;

/// Whether the console keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next command
    Continue,
    /// Leave the console
    Exit,
}

/// Where received updates are saved
#[derive(Debug)]
pub struct SaveSink {
    base: String,
    xml: AtomicBool,
    binary: AtomicBool,
}

impl SaveSink {
    /// Sink writing `<base>.xml` and `<base>.bin`, both off
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            xml: AtomicBool::new(false),
            binary: AtomicBool::new(false),
        }
    }

    fn path(&self, format: Format) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.base, format.extension()))
    }

    fn toggle(&self, format: Format) -> bool {
        let flag = match format {
            Format::Xml => &self.xml,
            Format::Binary => &self.binary,
        };
        !flag.fetch_xor(true, Ordering::SeqCst)
    }

    /// Append `node` to every enabled file
    ///
    /// # Errors
    ///
    /// Returns the first encoding or I/O failure
    pub fn save(&self, node: &Node) -> Result<()> {
        if self.xml.load(Ordering::SeqCst) {
            let path = self.path(Format::Xml);
            let text = Format::Xml.encode(node)?;
            append(&path, |file| file.write_all(&text).map_err(Into::into))?;
        }
        if self.binary.load(Ordering::SeqCst) {
            let path = self.path(Format::Binary);
            let bytes = Format::Binary.encode(node)?;
            append(&path, |file| {
                let mut writer = FrameWriter::new(file);
                writer.write_frame(&bytes)?;
                writer.flush()?;
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn append(path: &Path, write: impl FnOnce(&mut fs::File) -> Result<()>) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("opening {}", path.display()))?;
    write(&mut file).wrap_err_with(|| format!("writing {}", path.display()))
}

/// Command interpreter bound to one store
pub struct Console {
    store: Arc<LocalStore>,
    sink: Arc<SaveSink>,
}

impl Console {
    /// Console writing into `store` and saving under `output`
    #[must_use]
    pub fn new(store: Arc<LocalStore>, output: impl Into<String>) -> Self {
        Self {
            store,
            sink: Arc::new(SaveSink::new(output)),
        }
    }

    /// Print remote updates as they are applied and save them when a
    /// toggle is on
    pub fn watch(&self) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Node)>();
        self.store.register_callback(Pattern::everything(), move |event| {
            if event.origin == Origin::Remote {
                let _ = tx.send((event.path.to_string(), event.node.clone()));
            }
        });

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            while let Some((path, node)) = rx.recv().await {
                match to_xml(&node) {
                    Ok(text) => println!("<- PUT {} {}", path, text),
                    Err(e) => println!("<- PUT {} (unprintable: {})", path, e),
                }
                if let Err(e) = sink.save(&node) {
                    warn!(error = %e, "saving received update failed");
                }
            }
        })
    }

    /// Parse and run one line
    pub fn handle_line(&self, line: &str) -> Flow {
        self.handle_nested(line, 0)
    }

    fn handle_nested(&self, line: &str, depth: usize) -> Flow {
        match command::parse(line) {
            Ok(Some(command)) => self.execute(&command, depth),
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("error: {}", e);
                Flow::Continue
            }
        }
    }

    /// Run a parsed command; failures are printed, never fatal
    pub fn execute(&self, command: &Command, depth: usize) -> Flow {
        let outcome = match &command.action {
            Action::SendXml { path, xml } => self.send_xml(path, xml),
            Action::SendFile { path, file } => fs::read_to_string(file)
                .wrap_err_with(|| format!("reading {}", file))
                .and_then(|text| self.send_xml(path, &text)),
            Action::SendBinary { path, file } => fs::read(file)
                .wrap_err_with(|| format!("reading {}", file))
                .and_then(|bytes| Ok(arbor_codec::decode(&bytes)?))
                .and_then(|node| self.send(path, node)),
            Action::ToggleXml => {
                let on = self.sink.toggle(Format::Xml);
                println!("saving to {}: {}", self.sink.path(Format::Xml).display(), on_off(on));
                Ok(())
            }
            Action::ToggleBinary => {
                let on = self.sink.toggle(Format::Binary);
                println!("saving to {}: {}", self.sink.path(Format::Binary).display(), on_off(on));
                Ok(())
            }
            Action::Execute(file) => match self.run_script(file, depth) {
                Ok(Flow::Exit) => return Flow::Exit,
                Ok(Flow::Continue) => Ok(()),
                Err(e) => Err(e),
            },
            Action::Quit => return Flow::Exit,
            Action::Help => {
                println!("{}", HELP);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("error: {} failed: {:#}", command.action, e);
        }
        if command.exit_after { Flow::Exit } else { Flow::Continue }
    }

    fn send_xml(&self, path: &str, xml: &str) -> Result<()> {
        let node = arbor_codec::from_xml(xml)?;
        self.send(path, node)
    }

    fn send(&self, path: &str, node: Node) -> Result<()> {
        if !self.store.policy().publish.permits(path) {
            println!("note: {} is not published, the write stays local", path);
        }
        self.store.put(node, path)?;
        println!("-> PUT {}", path);
        Ok(())
    }

    fn run_script(&self, file: &str, depth: usize) -> Result<Flow> {
        if depth >= MAX_SCRIPT_DEPTH {
            return Err(eyre!("scripts nested deeper than {}", MAX_SCRIPT_DEPTH));
        }
        let text = fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file))?;
        for line in text.lines() {
            if self.handle_nested(line, depth + 1) == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Read commands from stdin until `q`, an `x` command or end of input
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read
    pub async fn repl(&self) -> Result<()> {
        println!("type h for help");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if self.handle_line(&line) == Flow::Exit {
                break;
            }
        }
        Ok(())
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
