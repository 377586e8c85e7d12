pub mod capture;
pub mod kpi;
pub mod measurement;
pub mod outcome;
