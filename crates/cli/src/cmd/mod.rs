mod check;
mod run;
mod tasks;

pub use check::cmd_check;
pub use run::cmd_run;
pub use tasks::cmd_tasks;
