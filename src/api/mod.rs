pub(crate) mod batch;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod interactive;
pub(crate) mod router;
