mod assessments;
mod users;

pub use assessments::*;
pub use users::*;
