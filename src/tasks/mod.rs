pub(crate) mod batch;
pub(crate) mod interactive;
pub(crate) mod scheduler;
