mod sweeper;
mod table;

pub use sweeper::spawn_sweeper;
pub use table::HitTable;
