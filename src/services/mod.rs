//! Service layer: the object store gateway, the metadata repository, and
//! the request-scoped workflows composing the two.

pub mod file_repo;
pub mod file_service;
pub mod object_store;
