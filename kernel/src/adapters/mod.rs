// Concrete collaborator implementations.

pub mod document;
