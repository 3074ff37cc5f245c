pub(crate) mod batch_provider;
pub(crate) mod content;
pub(crate) mod gemini;
pub(crate) mod inference;
pub(crate) mod remote_error;
pub(crate) mod storage;
