use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::Snapshot;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Détenteur unique du dernier snapshot publié.
///
/// Lecture sans verrou (chargement atomique d'un `Arc`), écriture par échange
/// atomique : un lecteur voit l'ancien ou le nouveau snapshot, jamais un mélange.
/// Seul le poller publie.
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
}

pub type SharedStore = Arc<SnapshotStore>;

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self { current: ArcSwapOption::empty() }
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    /// Remplace le snapshot courant. L'ancien est libéré quand son dernier lecteur le relâche.
    pub fn publish(&self, snapshot: Snapshot) {
        self.current.store(Some(Arc::new(snapshot)));
    }

    /// `None` tant qu'aucun cycle n'a abouti.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }
}
