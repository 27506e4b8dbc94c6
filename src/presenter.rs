//! Map presenter
//!
//! Composition root for the map screen. Owns the viewport, reads markers from
//! the feed, and routes gestures to the interaction controller. Rendering is
//! reduced to a serializable [`MapView`] that the host draws.

use log::{debug, info};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::feed::FeedState;
use crate::interaction::{CreateOutcome, DeleteOutcome, InteractionController};
use crate::model::{CategoryOption, Coordinate, EventId, MarkerSet, Region, CATEGORY_OPTIONS};

pub const PIN_TITLE: &str = "Aviso";

/// One map annotation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub id: EventId,
    pub title: &'static str,
    pub description: String,
    pub color: String,
    pub coordinate: Coordinate,
}

/// Category legend overlay. Presentation only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub expanded: bool,
    pub entries: &'static [CategoryOption],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MapView {
    /// No snapshot has arrived yet
    Loading,
    Ready {
        region: Region,
        pins: Vec<Pin>,
        legend: Legend,
        shows_user_location: bool,
    },
}

pub struct MapPresenter {
    region: watch::Sender<Region>,
    framed: AtomicBool,
    feed: watch::Receiver<FeedState>,
    legend_expanded: AtomicBool,
    controller: Arc<InteractionController>,
}

impl MapPresenter {
    pub fn new(
        default_region: Region,
        feed: watch::Receiver<FeedState>,
        controller: Arc<InteractionController>,
    ) -> Self {
        let (region, _) = watch::channel(default_region);
        Self {
            region,
            framed: AtomicBool::new(false),
            feed,
            legend_expanded: AtomicBool::new(false),
            controller,
        }
    }

    pub fn region(&self) -> Region {
        *self.region.borrow()
    }

    pub fn watch_region(&self) -> watch::Receiver<Region> {
        self.region.subscribe()
    }

    pub fn watch_feed(&self) -> watch::Receiver<FeedState> {
        self.feed.clone()
    }

    /// Center the map on the device fix. Only the first fix is applied;
    /// the feed never moves the viewport.
    pub fn frame_initial_position(&self, at: Coordinate) -> bool {
        if self.framed.swap(true, Ordering::SeqCst) {
            debug!("Region already framed, ignoring fix");
            return false;
        }
        self.region.send_modify(|region| *region = region.centered_on(at));
        info!("Map framed on ({}, {})", at.latitude, at.longitude);
        true
    }

    pub fn is_loading(&self) -> bool {
        !self.feed.borrow().loaded
    }

    /// Wait for the first snapshot. Returns false if the feed went away first.
    pub async fn wait_until_loaded(&self) -> bool {
        let mut feed = self.feed.clone();
        let loaded = feed.wait_for(|state| state.loaded).await.is_ok();
        loaded
    }

    pub fn markers(&self) -> MarkerSet {
        self.feed.borrow().markers.clone()
    }

    pub fn toggle_legend(&self) -> bool {
        !self.legend_expanded.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn legend(&self) -> Legend {
        Legend {
            expanded: self.legend_expanded.load(Ordering::SeqCst),
            entries: &CATEGORY_OPTIONS,
        }
    }

    pub fn render(&self) -> MapView {
        let feed = self.feed.borrow();
        if !feed.loaded {
            return MapView::Loading;
        }

        let pins = feed
            .markers
            .iter()
            .map(|record| Pin {
                id: record.id.clone(),
                title: PIN_TITLE,
                description: record.fields.value.clone(),
                color: record.fields.marker_color.clone(),
                coordinate: record.coordinate(),
            })
            .collect();

        MapView::Ready {
            region: self.region(),
            pins,
            legend: self.legend(),
            shows_user_location: true,
        }
    }

    pub async fn on_long_press(&self, at: Coordinate) -> CreateOutcome {
        self.controller.create(at).await
    }

    /// Callout press on the marker with identity `id`
    pub async fn on_callout_press(&self, id: &EventId) -> DeleteOutcome {
        let record = self.feed.borrow().markers.get(id).cloned();
        match record {
            Some(record) => self.controller.delete(&record).await,
            None => {
                debug!("Callout press for unknown marker {}", id);
                DeleteOutcome::NotFound
            }
        }
    }
}
