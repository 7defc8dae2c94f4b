//! Hook pipeline around parse, validate, handle, serialize and send.
//!
//! Hooks are grouped by stage. Within a stage they run strictly in
//! registration order, each one receiving the output of the previous one.
//! The first error aborts the stage and is returned to the caller; the
//! pipeline itself never reports or logs.
//!
//! Frame stages see raw transport frames:
//!
//! - [`FrameStage::OnMessage`] - inbound frame, earliest point
//! - [`FrameStage::PreParse`] - inbound frame, right before parsing
//! - [`FrameStage::PreSend`] - outbound frame, right before the transport write
//!
//! Value stages see parsed JSON payloads:
//!
//! - [`ValueStage::PreValidation`] - before schema validation (inbound and outbound)
//! - [`ValueStage::PreHandler`] - before the message handler
//! - [`ValueStage::PreSerialization`] - before an outbound payload is serialized

use crate::client::Client;
use crate::error::RouterError;
use crate::transport::Frame;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Stages that operate on raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    /// Inbound frame as received.
    OnMessage,
    /// Inbound frame before parsing.
    PreParse,
    /// Outbound frame before it is handed to the transport.
    PreSend,
}

/// Stages that operate on parsed payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueStage {
    /// Before schema validation.
    PreValidation,
    /// Before the message handler.
    PreHandler,
    /// Before outbound serialization.
    PreSerialization,
}

type HookFn<T> = dyn Fn(Arc<Client>, T) -> BoxFuture<'static, Result<T, RouterError>> + Send + Sync;

/// An async transform `(client, data) -> data`.
pub struct Hook<T> {
    inner: Arc<HookFn<T>>,
}

impl<T: Send + 'static> Hook<T> {
    /// Wrap an async function as a hook.
    pub fn new<F, Fut>(hook: F) -> Self
    where
        F: Fn(Arc<Client>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RouterError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(
                move |client: Arc<Client>, data: T| -> BoxFuture<'static, Result<T, RouterError>> {
                    Box::pin(hook(client, data))
                },
            ),
        }
    }

    /// Invoke the hook.
    pub fn call(&self, client: Arc<Client>, data: T) -> BoxFuture<'static, Result<T, RouterError>> {
        (self.inner)(client, data)
    }
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

struct Stages<S, T> {
    hooks: HashMap<S, Vec<Hook<T>>>,
}

impl<S, T> Default for Stages<S, T> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }
}

impl<S: Clone, T> Clone for Stages<S, T> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<S, T> Stages<S, T>
where
    S: Copy + Eq + Hash,
    T: Send + 'static,
{
    fn add(&mut self, stage: S, hook: Hook<T>) {
        self.hooks.entry(stage).or_default().push(hook);
    }

    fn get(&self, stage: S) -> &[Hook<T>] {
        self.hooks.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    async fn run(&self, stage: S, client: &Arc<Client>, mut data: T) -> Result<T, RouterError> {
        for hook in self.get(stage) {
            data = hook.call(Arc::clone(client), data).await?;
        }
        Ok(data)
    }
}

/// Ordered hooks for every stage of one channel.
#[derive(Clone, Default)]
pub struct HookPipeline {
    frames: Stages<FrameStage, Frame>,
    values: Stages<ValueStage, Value>,
}

impl HookPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to a frame stage.
    pub fn add_frame_hook(&mut self, stage: FrameStage, hook: Hook<Frame>) {
        self.frames.add(stage, hook);
    }

    /// Append a hook to a value stage.
    pub fn add_value_hook(&mut self, stage: ValueStage, hook: Hook<Value>) {
        self.values.add(stage, hook);
    }

    /// Number of hooks registered for a frame stage.
    pub fn frame_hook_count(&self, stage: FrameStage) -> usize {
        self.frames.get(stage).len()
    }

    /// Number of hooks registered for a value stage.
    pub fn value_hook_count(&self, stage: ValueStage) -> usize {
        self.values.get(stage).len()
    }

    /// Fold a frame through every hook of the stage.
    pub async fn run_frames(
        &self,
        stage: FrameStage,
        client: &Arc<Client>,
        frame: Frame,
    ) -> Result<Frame, RouterError> {
        self.frames.run(stage, client, frame).await
    }

    /// Fold a payload through every hook of the stage.
    pub async fn run_values(
        &self,
        stage: ValueStage,
        client: &Arc<Client>,
        payload: Value,
    ) -> Result<Value, RouterError> {
        self.values.run(stage, client, payload).await
    }
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("frame_stages", &self.frames.hooks.len())
            .field("value_stages", &self.values.hooks.len())
            .finish()
    }
}
