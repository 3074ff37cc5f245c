pub(crate) mod batch_jobs;
pub(crate) mod books;
pub(crate) mod pages;
pub(crate) mod store;
