//! Wardrobe stores.
//!
//! Dressing: trousers and socks first, then shoes, then the coat.
//! Undressing runs the other way round.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use circuit_dispatch::{
    Agreement, Channel, DispatcherBuilder, DispatcherHandle, Result, StoreCallback, StoreId,
};
use tracing::info;

use crate::actions::WardrobeAction;

pub const TROUSERS: StoreId = StoreId::new("trousers");
pub const SOCKS: StoreId = StoreId::new("socks");
pub const SHOES: StoreId = StoreId::new("shoes");
pub const COAT: StoreId = StoreId::new("coat");

const WEATHER_CHECK: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Garment
// ---------------------------------------------------------------------------

/// A garment that is either worn or not.
pub struct Garment {
    id: StoreId,
    dress_after: Vec<StoreId>,
    undress_after: Vec<StoreId>,
    worn: AtomicBool,
}

impl Garment {
    pub fn new(id: StoreId, dress_after: &[StoreId], undress_after: &[StoreId]) -> Self {
        Self {
            id,
            dress_after: dress_after.to_vec(),
            undress_after: undress_after.to_vec(),
            worn: AtomicBool::new(false),
        }
    }

    pub fn is_worn(&self) -> bool {
        self.worn.load(Ordering::SeqCst)
    }
}

impl StoreCallback<WardrobeAction> for Garment {
    fn vote_for(&self, action: &WardrobeAction) -> Agreement {
        match action {
            WardrobeAction::Dress => Agreement::depends_on(self.dress_after.iter().copied()),
            WardrobeAction::Undress => Agreement::depends_on(self.undress_after.iter().copied()),
            WardrobeAction::Launder => Agreement::none(),
        }
    }

    fn complete(&self, action: &WardrobeAction, channel: Channel) {
        self.worn
            .store(matches!(action, WardrobeAction::Dress), Ordering::SeqCst);
        channel.ack();
    }

    fn signal_change(&self, action: &WardrobeAction) {
        info!(store = %self.id, worn = self.is_worn(), action = ?action, "Garment changed");
    }
}

// ---------------------------------------------------------------------------
// Socks
// ---------------------------------------------------------------------------

/// Socks get dirty when taken off and refuse to be worn until laundered.
pub struct Socks {
    handle: DispatcherHandle<WardrobeAction>,
    worn: AtomicBool,
    dirty: AtomicBool,
    washes: AtomicU32,
}

impl Socks {
    pub fn new(handle: DispatcherHandle<WardrobeAction>) -> Self {
        Self {
            handle,
            worn: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            washes: AtomicU32::new(0),
        }
    }

    pub fn is_worn(&self) -> bool {
        self.worn.load(Ordering::SeqCst)
    }

    pub fn washes(&self) -> u32 {
        self.washes.load(Ordering::SeqCst)
    }
}

impl StoreCallback<WardrobeAction> for Socks {
    fn vote_for(&self, action: &WardrobeAction) -> Agreement {
        match action {
            WardrobeAction::Dress | WardrobeAction::Launder => Agreement::approved(),
            WardrobeAction::Undress => Agreement::depends_on([SHOES]),
        }
    }

    fn complete(&self, action: &WardrobeAction, channel: Channel) {
        match action {
            WardrobeAction::Dress if self.dirty.load(Ordering::SeqCst) => {
                channel.nack(anyhow::anyhow!("no clean socks"));
            }
            WardrobeAction::Dress => {
                self.worn.store(true, Ordering::SeqCst);
                channel.ack();
            }
            WardrobeAction::Undress => {
                self.worn.store(false, Ordering::SeqCst);
                self.dirty.store(true, Ordering::SeqCst);
                // Queued behind the current action.
                self.handle.dispatch(WardrobeAction::Launder);
                channel.ack();
            }
            WardrobeAction::Launder => {
                self.dirty.store(false, Ordering::SeqCst);
                self.washes.fetch_add(1, Ordering::SeqCst);
                channel.ack();
            }
        }
    }

    fn signal_change(&self, action: &WardrobeAction) {
        info!(store = %SOCKS, worn = self.is_worn(), action = ?action, "Socks changed");
    }
}

// ---------------------------------------------------------------------------
// Coat
// ---------------------------------------------------------------------------

/// Checks the weather before going on, so it acks from a spawned task.
#[derive(Default)]
pub struct Coat {
    worn: Arc<AtomicBool>,
}

impl Coat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_worn(&self) -> bool {
        self.worn.load(Ordering::SeqCst)
    }
}

impl StoreCallback<WardrobeAction> for Coat {
    fn vote_for(&self, action: &WardrobeAction) -> Agreement {
        match action {
            WardrobeAction::Dress => Agreement::depends_on([SHOES]),
            WardrobeAction::Undress => Agreement::approved(),
            WardrobeAction::Launder => Agreement::none(),
        }
    }

    fn complete(&self, action: &WardrobeAction, channel: Channel) {
        let worn = self.worn.clone();
        let dress = matches!(action, WardrobeAction::Dress);
        tokio::spawn(async move {
            if dress {
                tokio::time::sleep(WEATHER_CHECK).await;
            }
            worn.store(dress, Ordering::SeqCst);
            channel.ack();
        });
    }

    fn signal_change(&self, action: &WardrobeAction) {
        info!(store = %COAT, worn = self.is_worn(), action = ?action, "Coat changed");
    }
}

// ---------------------------------------------------------------------------
// Wardrobe
// ---------------------------------------------------------------------------

/// All stores, kept around for reading their state.
pub struct Wardrobe {
    pub trousers: Arc<Garment>,
    pub socks: Arc<Socks>,
    pub shoes: Arc<Garment>,
    pub coat: Arc<Coat>,
}

impl Wardrobe {
    pub fn new(handle: DispatcherHandle<WardrobeAction>) -> Self {
        Self {
            trousers: Arc::new(Garment::new(TROUSERS, &[], &[SHOES])),
            socks: Arc::new(Socks::new(handle)),
            shoes: Arc::new(Garment::new(SHOES, &[TROUSERS, SOCKS], &[COAT])),
            coat: Arc::new(Coat::new()),
        }
    }

    pub fn register(
        &self,
        builder: DispatcherBuilder<WardrobeAction>,
    ) -> Result<DispatcherBuilder<WardrobeAction>> {
        builder
            .register(TROUSERS, self.trousers.clone())?
            .register(SOCKS, self.socks.clone())?
            .register(SHOES, self.shoes.clone())?
            .register(COAT, self.coat.clone())
    }

    pub fn worn(&self) -> Vec<(StoreId, bool)> {
        vec![
            (TROUSERS, self.trousers.is_worn()),
            (SOCKS, self.socks.is_worn()),
            (SHOES, self.shoes.is_worn()),
            (COAT, self.coat.is_worn()),
        ]
    }
}
