mod check;
mod compile;
mod history;

pub(crate) use check::cmd_check;
pub(crate) use compile::cmd_compile;
pub(crate) use history::cmd_history;
