//! Board views derived from a task list.

use crate::task::{Task, TaskStatus};

/// Tasks split into board columns by derived status, keeping input order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Board<'a> {
    /// `progress == 0`.
    pub todo: Vec<&'a Task>,
    /// `0 < progress < 100`.
    pub in_progress: Vec<&'a Task>,
    /// `progress == 100`.
    pub done: Vec<&'a Task>,
}

impl<'a> Board<'a> {
    /// Splits tasks into columns.
    #[must_use]
    pub fn categorize(tasks: &'a [Task]) -> Self {
        let mut board = Self::default();
        for task in tasks {
            match task.status() {
                TaskStatus::Todo => board.todo.push(task),
                TaskStatus::InProgress => board.in_progress.push(task),
                TaskStatus::Done => board.done.push(task),
            }
        }
        board
    }

    /// Unfinished tasks, earliest due date first.
    #[must_use]
    pub fn upcoming(&self) -> Vec<&'a Task> {
        let mut upcoming: Vec<&Task> = self
            .todo
            .iter()
            .chain(self.in_progress.iter())
            .copied()
            .collect();
        upcoming.sort_by_key(|t| t.due_date);
        upcoming
    }
}
