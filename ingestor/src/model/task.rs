use crate::model::symbol::SymbolRef;

/// One symbol awaiting a fetch, with the number of parse failures it has
/// already accumulated in this cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskItem {
    pub symbol: SymbolRef,
    pub attempt: u32,
}

impl TaskItem {
    pub fn fresh(symbol: SymbolRef) -> Self {
        Self { symbol, attempt: 0 }
    }

    /// The same symbol carrying one more failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            symbol: self.symbol.clone(),
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// Transient unit of work living only in the task queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskBatch {
    pub items: Vec<TaskItem>,
}

impl TaskBatch {
    pub fn new(items: Vec<TaskItem>) -> Self {
        Self { items }
    }

    pub fn fresh(symbols: impl IntoIterator<Item = SymbolRef>) -> Self {
        Self {
            items: symbols.into_iter().map(TaskItem::fresh).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
