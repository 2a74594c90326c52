// ── Selection controller ──
//
// Turns species / attribute / top-ten changes into one layer + legend +
// sidebar refresh. Refreshes may overlap; each takes a sequence token
// when its selection is recorded, and only the holder of the newest token
// may swap the raster layer or publish display state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::catalog::{Species, SpeciesCatalog};
use crate::error::CoreError;
use crate::map::{LegendView, MapSession, RANGE_ATTRIBUTE, StyleOptions, style_name};

// ── Attribute menu ───────────────────────────────────────────────────

/// One row of the attribute dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuEntry {
    /// Non-selectable separator between sections.
    Divider,
    /// Non-selectable section title.
    Header { label: String },
    /// A selectable attribute.
    Option { key: String, label: String },
}

pub const MENU_DIVIDER: &str = "─────────────";

/// The attribute dropdown for one species, sections in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeMenu {
    entries: Vec<MenuEntry>,
}

impl AttributeMenu {
    /// Header per section, dividers before every section except `basics`.
    pub fn build(species: &Species) -> Self {
        let mut entries = Vec::new();
        for (section_key, section) in &species.attributes {
            if section_key != "basics" {
                entries.push(MenuEntry::Divider);
            }
            entries.push(MenuEntry::Header {
                label: section.label.clone(),
            });
            entries.extend(section.items.iter().map(|(key, label)| MenuEntry::Option {
                key: key.clone(),
                label: label.clone(),
            }));
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    /// Selectable keys in menu order.
    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            MenuEntry::Option { key, .. } => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.options().any(|k| k == key)
    }

    /// `keep` if it is a real option, otherwise the first option.
    /// Never lands on a divider or header.
    pub fn select(&self, keep: Option<&str>) -> Option<String> {
        keep.filter(|k| self.contains(k))
            .or_else(|| self.options().next())
            .map(str::to_owned)
    }
}

// ── State ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub species_id: Option<String>,
    pub attribute: Option<String>,
    pub top_ten_only: bool,
}

/// Everything the side panel shows, as of the latest completed refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    pub species_id: Option<String>,
    pub attribute: Option<String>,
    pub top_ten_only: bool,
    /// Style of the attached raster layer.
    pub style: Option<String>,
    pub legend: LegendView,
    pub sidebar_background: Option<String>,
    pub attribute_menu: AttributeMenu,
    /// Token of the refresh that produced this state.
    pub sequence: u64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            species_id: None,
            attribute: None,
            top_ten_only: false,
            style: None,
            legend: LegendView::SelectAttribute,
            sidebar_background: None,
            attribute_menu: AttributeMenu::default(),
            sequence: 0,
        }
    }
}

/// How a refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This refresh's result is on display.
    Applied,
    /// A newer selection arrived first; this result was discarded.
    Superseded,
}

/// A recorded selection plus the token that owns its refresh.
struct Ticket {
    token: u64,
    selection: SelectionState,
    menu: AttributeMenu,
}

// ── SelectionController ──────────────────────────────────────────────

/// Cheaply cloneable via `Arc<SelectionInner>`.
#[derive(Clone)]
pub struct SelectionController {
    inner: Arc<SelectionInner>,
}

struct SelectionInner {
    session: MapSession,
    catalog: Arc<SpeciesCatalog>,
    state: Mutex<(SelectionState, AttributeMenu)>,
    sequence: AtomicU64,
    /// Serializes raster swaps so a stale token can never attach last.
    apply_lock: tokio::sync::Mutex<()>,
    sidebar_cache: DashMap<String, Option<String>>,
    display: watch::Sender<DisplayState>,
}

impl SelectionController {
    pub fn new(session: MapSession, catalog: Arc<SpeciesCatalog>) -> Self {
        let (display, _) = watch::channel(DisplayState::default());
        Self {
            inner: Arc::new(SelectionInner {
                session,
                catalog,
                state: Mutex::new((SelectionState::default(), AttributeMenu::default())),
                sequence: AtomicU64::new(0),
                apply_lock: tokio::sync::Mutex::new(()),
                sidebar_cache: DashMap::new(),
                display,
            }),
        }
    }

    pub fn session(&self) -> &MapSession {
        &self.inner.session
    }

    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.inner.catalog
    }

    pub fn selection(&self) -> SelectionState {
        self.lock_state().0.clone()
    }

    pub fn display(&self) -> DisplayState {
        self.inner.display.borrow().clone()
    }

    pub fn watch_display(&self) -> watch::Receiver<DisplayState> {
        self.inner.display.subscribe()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, (SelectionState, AttributeMenu)> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_latest(&self, token: u64) -> bool {
        self.inner.sequence.load(Ordering::SeqCst) == token
    }

    /// Record a selection change and take the newest token, atomically
    /// with respect to other changes.
    fn record(
        &self,
        change: impl FnOnce(&mut SelectionState, &mut AttributeMenu) -> Result<(), CoreError>,
    ) -> Result<Ticket, CoreError> {
        let mut guard = self.lock_state();
        let (selection, menu) = &mut *guard;
        change(selection, menu)?;
        let token = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Ticket {
            token,
            selection: selection.clone(),
            menu: menu.clone(),
        })
    }

    // ── User events ──────────────────────────────────────────────────

    /// Select the default species with `Range`, then refresh layer,
    /// legend, and sidebar.
    pub async fn initialize(&self) -> Result<RefreshOutcome, CoreError> {
        let species_id = self
            .inner
            .catalog
            .default_species_id()
            .ok_or_else(|| CoreError::Config {
                message: "No enabled species found in configuration".into(),
            })?
            .to_owned();
        self.inner.session.init_map().await?;
        self.change_species(&species_id, Some(RANGE_ATTRIBUTE)).await
    }

    /// Switch species, keeping the current attribute when the new
    /// species offers it.
    pub async fn handle_species_change(&self, species_id: &str) -> Result<RefreshOutcome, CoreError> {
        self.change_species(species_id, None).await
    }

    /// `preferred` wins over the attribute selected when the change is
    /// recorded.
    async fn change_species(
        &self,
        species_id: &str,
        preferred: Option<&str>,
    ) -> Result<RefreshOutcome, CoreError> {
        let catalog = Arc::clone(&self.inner.catalog);
        let species = catalog.require(species_id)?;
        let ticket = self.record(|selection, menu| {
            let keep = preferred
                .map(str::to_owned)
                .or_else(|| selection.attribute.take());
            *menu = AttributeMenu::build(species);
            selection.species_id = Some(species_id.to_owned());
            selection.attribute = menu.select(keep.as_deref());
            Ok(())
        })?;
        debug!(token = ticket.token, species_id, "species changed");
        self.refresh(ticket).await
    }

    pub async fn handle_attribute_change(&self, attribute: &str) -> Result<RefreshOutcome, CoreError> {
        let ticket = self.record(|selection, menu| {
            if !menu.contains(attribute) {
                return Err(CoreError::UnknownAttribute {
                    attribute: attribute.to_owned(),
                    species_id: selection.species_id.clone().unwrap_or_default(),
                });
            }
            selection.attribute = Some(attribute.to_owned());
            Ok(())
        })?;
        debug!(token = ticket.token, attribute, "attribute changed");
        self.refresh(ticket).await
    }

    pub async fn handle_top_ten_change(&self, top_ten_only: bool) -> Result<RefreshOutcome, CoreError> {
        let ticket = self.record(|selection, _| {
            selection.top_ten_only = top_ten_only;
            Ok(())
        })?;
        debug!(token = ticket.token, top_ten_only, "top-ten toggled");
        self.refresh(ticket).await
    }

    // ── Refresh ──────────────────────────────────────────────────────

    async fn refresh(&self, ticket: Ticket) -> Result<RefreshOutcome, CoreError> {
        let Ticket {
            token,
            selection,
            menu,
        } = ticket;
        let species_id = selection
            .species_id
            .clone()
            .ok_or(CoreError::MissingSelection { what: "species" })?;
        let species = self.inner.catalog.require(&species_id)?.clone();

        let (layer, sidebar) = futures::join!(
            self.refresh_layer_and_legend(token, &species, &selection),
            self.sidebar_background(&species_id, &species),
        );
        let (style, legend) = match layer {
            Ok(Some(done)) => done,
            Ok(None) => return Ok(RefreshOutcome::Superseded),
            Err(e) => {
                error!(error = %e, species_id, "failed to update map layer");
                return Err(e);
            }
        };

        let applied = self.inner.display.send_if_modified(|display| {
            if !self.is_latest(token) {
                return false;
            }
            *display = DisplayState {
                species_id: selection.species_id,
                attribute: selection.attribute,
                top_ten_only: selection.top_ten_only,
                style,
                legend,
                sidebar_background: sidebar,
                attribute_menu: menu,
                sequence: token,
            };
            true
        });

        if applied {
            Ok(RefreshOutcome::Applied)
        } else {
            debug!(token, "refresh superseded");
            Ok(RefreshOutcome::Superseded)
        }
    }

    /// Swap the raster layer (if still latest) and resolve the legend.
    /// `Ok(None)` means the refresh was superseded.
    async fn refresh_layer_and_legend(
        &self,
        token: u64,
        species: &Species,
        selection: &SelectionState,
    ) -> Result<Option<(Option<String>, LegendView)>, CoreError> {
        let attribute = selection.attribute.as_deref();
        let options = StyleOptions::top_ten(selection.top_ten_only);
        let session = &self.inner.session;

        {
            let _apply = self.inner.apply_lock.lock().await;
            if !self.is_latest(token) {
                return Ok(None);
            }
            session
                .update_raster_layer(Some(&species.raster_layer), attribute, options)
                .await?;
        }

        let Some(attribute) = attribute else {
            return Ok(Some((None, LegendView::SelectAttribute)));
        };
        let style = style_name(&species.raster_layer, attribute, options);

        // Range has no legend worth showing.
        if attribute == RANGE_ATTRIBUTE {
            return Ok(Some((Some(style), LegendView::Hidden)));
        }

        if self.is_latest(token) {
            self.inner
                .display
                .send_modify(|display| display.legend = LegendView::Loading);
        }
        let legend = session.fetch_legend(&species.raster_layer, &style).await;
        Ok(Some((Some(style), legend)))
    }

    /// Resolve the sidebar image for a species, once per species.
    async fn sidebar_background(&self, species_id: &str, species: &Species) -> Option<String> {
        if let Some(cached) = self.inner.sidebar_cache.get(species_id) {
            return cached.clone();
        }
        let resolved = self.resolve_background(species).await;
        self.inner
            .sidebar_cache
            .insert(species_id.to_owned(), resolved.clone());
        resolved
    }

    async fn resolve_background(&self, species: &Species) -> Option<String> {
        let image = species.background_image.as_deref()?;
        let connection = self.inner.session.connection();
        let Some(url) = connection.config().resolve_asset(image) else {
            // Nothing to fetch it from; hand the path to the renderer as-is.
            return Some(image.to_owned());
        };
        match connection.preload_image(&url).await {
            Ok(()) => Some(url.to_string()),
            Err(e) => {
                warn!(error = %e, image, "background image loading failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn menu_has_headers_and_dividers_between_sections() {
        let catalog = SpeciesCatalog::builtin();
        let menu = AttributeMenu::build(catalog.require("psme").unwrap());

        let entries = menu.entries();
        assert_eq!(
            entries[0],
            MenuEntry::Header {
                label: "Basic Information".into()
            }
        );
        assert!(matches!(entries[1], MenuEntry::Option { ref key, .. } if key == "Range"));
        let dividers = entries.iter().filter(|e| **e == MenuEntry::Divider).count();
        assert_eq!(dividers, 2);
        assert_eq!(menu.options().count(), 11);
    }

    #[test]
    fn select_keeps_known_key_and_falls_back_to_first_option() {
        let catalog = SpeciesCatalog::builtin();
        let menu = AttributeMenu::build(catalog.get_species("pipo").unwrap());

        assert_eq!(
            menu.select(Some("FireIntensityRiskCat")).as_deref(),
            Some("FireIntensityRiskCat")
        );
        assert_eq!(menu.select(Some("Risk Factors")).as_deref(), Some("Range"));
        assert_eq!(menu.select(None).as_deref(), Some("Range"));
        assert_eq!(AttributeMenu::default().select(Some("Range")), None);
    }
}
