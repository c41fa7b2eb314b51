pub mod resolve;
pub mod serve;
pub mod timetable;
