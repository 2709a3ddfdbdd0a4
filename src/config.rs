/// Engine-wide tuning knobs.
///
/// `max_level` and `p` govern the probabilistic height distribution of both
/// the item index and the snapshot set. Neither is runtime-tunable once an
/// [`crate::engine::Engine`] has been built — changing them requires a fresh
/// instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on node height for every skiplist the engine owns.
    pub max_level: usize,
    /// Probability a node promotes to the next level (geometric distribution).
    pub p: f64,
    /// Capacity of the bounded GC channel.
    pub gc_channel_capacity: usize,
    /// Directory snapshot dump files are written to and read from.
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_level: 4,
            p: 0.25,
            gc_channel_capacity: 16,
            data_dir: "./data".to_string(),
        }
    }
}
