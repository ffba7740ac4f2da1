//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use devonthink_mcp::exec::CommandRunner;
use devonthink_mcp::layout::{PrefValue, PreferenceStore, WriteBatch};
use devonthink_mcp::{Error, Result};

type Handler = Box<dyn Fn(&str, &[String]) -> Result<String> + Send + Sync>;

/// Command runner answering from a closure and recording every call.
pub struct ScriptedRunner {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new(handler: impl Fn(&str, &[String]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner that fails the test if it is ever invoked.
    pub fn unused() -> Self {
        Self::new(|program, args| panic!("unexpected command: {program} {args:?}"))
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        (self.handler)(program, args)
    }
}

pub fn command_failed(command: &str, stderr: &str) -> Error {
    Error::CommandFailed {
        command: command.to_string(),
        stderr: stderr.to_string(),
    }
}

/// In-memory preference store.
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<BTreeMap<String, PrefValue>>,
    /// Report writes as done without keeping them.
    drop_writes: bool,
    applies: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes silently vanish.
    pub fn dropping_writes() -> Self {
        Self {
            drop_writes: true,
            ..Self::default()
        }
    }

    pub fn with(self, key: &str, value: PrefValue) -> Self {
        self.keys.lock().unwrap().insert(key.to_string(), value);
        self
    }

    pub fn snapshot(&self) -> BTreeMap<String, PrefValue> {
        self.keys.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        *self.applies.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl PreferenceStore for MemoryStore {
    async fn read_key(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self.keys.lock().unwrap().get(key).cloned())
    }

    async fn key_names(&self) -> Result<Vec<String>> {
        Ok(self.keys.lock().unwrap().keys().cloned().collect())
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<String>> {
        *self.applies.lock().unwrap() += 1;
        let mut keys = self.keys.lock().unwrap();
        let mut staged = keys.clone();
        let mut written = Vec::new();
        for copy in batch.copies() {
            if let Some(value) = keys.get(&copy.from) {
                staged.insert(copy.to.clone(), value.clone());
                written.push(copy.to.clone());
            }
        }
        if !written.is_empty() && !self.drop_writes {
            *keys = staged;
        }
        Ok(written)
    }
}

pub fn list(items: &[&str]) -> PrefValue {
    PrefValue::List(items.iter().map(|s| s.to_string()).collect())
}

pub fn widths(items: &[(&str, f64)]) -> PrefValue {
    PrefValue::Numbers(
        items
            .iter()
            .map(|(name, width)| (name.to_string(), *width))
            .collect(),
    )
}
