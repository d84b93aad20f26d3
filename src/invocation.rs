//! Invocation payload and host supplied context handed to instrumented handlers

use serde::Deserialize;

/// The part of the host's invocation context the instrumentation relies on
pub trait FunctionContext {
    fn function_name(&self) -> &str;
}

/// Azure Functions invocation context
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Context {
    pub function_name: String,
    #[serde(default)]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub function_directory: Option<String>,
}

impl Context {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            ..Default::default()
        }
    }
}

impl FunctionContext for Context {
    fn function_name(&self) -> &str {
        &self.function_name
    }
}

/// A request together with its [Context], the input of every instrumented handler
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Invocation<T> {
    pub payload: T,
    pub context: Context,
}

impl<T> Invocation<T> {
    pub fn new(payload: T, context: Context) -> Self {
        Self { payload, context }
    }
}
