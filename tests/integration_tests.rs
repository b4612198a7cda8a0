//! Integration tests module loader

mod support;

mod unit {
    pub mod geotag_example;
    pub mod rational_properties;
}

mod integration {
    pub mod partial_failure;
    pub mod rate_limiting;
    pub mod resume_capability;
    pub mod retry_subset;
    pub mod writer_idempotence;
}
