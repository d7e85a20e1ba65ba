pub mod analytics;
pub mod assignments;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod grades;
pub mod rubrics;
pub mod settings;
pub mod students;
pub mod submissions;
