pub mod annotations;
pub mod chat_messages;
pub mod project_models;
pub mod projects;
