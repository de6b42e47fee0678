pub mod category;
pub mod recurring_task;
pub mod reminder;
pub mod task;

pub use category::CategoryRepository;
pub use recurring_task::RecurringTaskRepository;
pub use reminder::ReminderRepository;
pub use task::TaskRepository;
