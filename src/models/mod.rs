mod timesheet;
mod usage;

pub use timesheet::{RemoteTimesheet, TimesheetList};
pub use usage::UsageSample;
