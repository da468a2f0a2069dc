// dashboard_utils.rs
use crate::cache_utils::{population_fingerprint, PopulationSnapshot, SnapshotCache};
use crate::flatten_utils::flatten_raw_documents;
use crate::geo_utils::{GeoBoundary, GeoConfig, GeoConnect};
use crate::stats_utils::{
    attrition_distribution, departamento_slices, pais_slices, summarize,
    AttritionDistribution, PopulationSummary, RecordFilter, SliceStat,
};
use crate::store_utils::{StoreConfig, StoreConnect};
use anyhow::anyhow;

/// A dashboard view either has its data or an explicit reason it does not. One
/// failing upstream never blanks the independent views.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> ViewState<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            ViewState::Unavailable(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready(_))
    }

    fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ViewState::Ready(value),
            Err(e) => ViewState::Unavailable(e.to_string()),
        }
    }
}

/// Everything one render pass hands to the chart layer.
#[derive(Debug)]
pub struct DashboardData {
    pub summary: ViewState<PopulationSummary>,
    pub por_departamento: ViewState<Vec<SliceStat>>,
    pub internacional: ViewState<Vec<SliceStat>>,
    pub distribucion: ViewState<AttritionDistribution>,
    pub boundaries: ViewState<Vec<GeoBoundary>>,
    pub fingerprint: String,
    pub rejected_documents: usize,
}

/// Builds every record-derived view from one snapshot and one filter. Pure; the
/// snapshot already pairs records with their context, so all views describe the same
/// population state.
pub fn assemble_views(
    snapshot: &PopulationSnapshot,
    filter: &RecordFilter,
    boundaries: ViewState<Vec<GeoBoundary>>,
) -> DashboardData {
    let selection = filter.apply(&snapshot.records);
    let distribucion = match attrition_distribution(&selection) {
        Some(dist) => ViewState::Ready(dist),
        None => ViewState::Unavailable("No hay datos para la selección actual".to_string()),
    };

    DashboardData {
        summary: ViewState::Ready(summarize(&snapshot.records)),
        por_departamento: ViewState::from_result(departamento_slices(&snapshot.records)),
        internacional: ViewState::from_result(pais_slices(&snapshot.records)),
        distribucion,
        boundaries,
        fingerprint: snapshot.fingerprint.clone(),
        rejected_documents: snapshot.rejected_count,
    }
}

fn all_unavailable(reason: &str) -> DashboardData {
    DashboardData {
        summary: ViewState::Unavailable(reason.to_string()),
        por_departamento: ViewState::Unavailable(reason.to_string()),
        internacional: ViewState::Unavailable(reason.to_string()),
        distribucion: ViewState::Unavailable(reason.to_string()),
        boundaries: ViewState::Unavailable(reason.to_string()),
        fingerprint: String::new(),
        rejected_documents: 0,
    }
}

/// Orchestrates one full request/response pass: fetch, flatten, snapshot, aggregate.
/// Owns the snapshot cache; every refresh replaces records and context as one value.
pub struct Dashboard {
    store: StoreConfig,
    geo: GeoConfig,
    cache: SnapshotCache,
}

impl Dashboard {
    pub fn new(store: StoreConfig, geo: GeoConfig, cache_ttl_minutes: i64) -> Self {
        Dashboard {
            store,
            geo,
            cache: SnapshotCache::new(cache_ttl_minutes),
        }
    }

    /// The last refreshed snapshot, for score requests that must encode with the
    /// same context the displayed population was built from.
    pub fn snapshot(&self) -> Option<&PopulationSnapshot> {
        self.cache.current()
    }

    async fn refresh_snapshot(&mut self) -> anyhow::Result<()> {
        let count = StoreConnect::count(&self.store)
            .await
            .map_err(|e| anyhow!("{}", e))?;

        let documents = StoreConnect::find_all(&self.store)
            .await
            .map_err(|e| anyhow!("{}", e))?;
        let report = flatten_raw_documents(&documents);
        let latest_period = report
            .records
            .iter()
            .map(|r| r.periodo.as_str())
            .max()
            .map(str::to_string);
        let fingerprint = population_fingerprint(count, latest_period.as_deref());

        if self.cache.fresh(&fingerprint).is_some() {
            return Ok(());
        }
        self.cache
            .replace(PopulationSnapshot::build(report, &fingerprint));
        Ok(())
    }

    /// Runs one render pass to completion. Store failures fall back to the last
    /// snapshot when one exists; with no snapshot at all, every view reports the
    /// outage explicitly instead of the page crashing.
    pub async fn render(&mut self, filter: &RecordFilter) -> DashboardData {
        let refresh_error = self.refresh_snapshot().await.err();
        if let Some(e) = &refresh_error {
            eprintln!("Population refresh failed: {}", e);
        }

        let boundaries = ViewState::from_result(
            GeoConnect::fetch_boundaries(&self.geo)
                .await
                .map_err(|e| anyhow!("{}", e)),
        );

        match self.cache.current() {
            Some(snapshot) => assemble_views(snapshot, filter, boundaries),
            None => all_unavailable(&format!(
                "Base de datos no disponible: {}",
                refresh_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "sin datos".to_string())
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> PopulationSnapshot {
        let values = vec![
            json!({
                "_id": "est-001",
                "datos_personales": {"genero": "F", "estrato": 2},
                "location": {"departamento": "Atlantico", "pais": "Colombia", "es_colombia": 1},
                "metricas_rendimiento": {"promedio_acumulado": 4.0},
                "estado": {"desertor": 0},
                "periodo_info": {"ultimo_periodo": 202410}
            }),
            json!({
                "_id": "est-002",
                "datos_personales": {"genero": "M", "estrato": 5},
                "location": {"pais": "Peru", "es_colombia": 0},
                "metricas_rendimiento": {"promedio_acumulado": 2.9},
                "estado": {"desertor": 1},
                "periodo_info": {"ultimo_periodo": 202430}
            }),
            json!({"sin_id": true}),
        ];
        PopulationSnapshot::build(flatten_raw_documents(&values), "3:202430")
    }

    #[test]
    fn views_assemble_from_one_snapshot() {
        let data = assemble_views(
            &snapshot(),
            &RecordFilter::default(),
            ViewState::Unavailable("offline".to_string()),
        );

        let summary = data.summary.ready().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.desertores, 1);
        assert!(data.por_departamento.is_ready());
        assert!(data.internacional.is_ready());
        assert!(data.distribucion.is_ready());
        assert!(!data.boundaries.is_ready());
        assert_eq!(data.fingerprint, "3:202430");
        assert_eq!(data.rejected_documents, 1);
    }

    #[test]
    fn boundary_outage_degrades_only_the_map_view() {
        let data = assemble_views(
            &snapshot(),
            &RecordFilter::default(),
            ViewState::Unavailable("fetch failed".to_string()),
        );
        assert!(data.summary.is_ready());
        assert_eq!(
            data.boundaries,
            ViewState::Unavailable("fetch failed".to_string())
        );
    }

    #[test]
    fn empty_filter_selection_reports_an_explicit_state() {
        let filter = RecordFilter {
            generos: vec!["X".to_string()],
            ..RecordFilter::default()
        };
        let data = assemble_views(
            &snapshot(),
            &filter,
            ViewState::Ready(Vec::new()),
        );
        assert!(!data.distribucion.is_ready());
        assert!(data.summary.is_ready());
    }
}
