// stats_utils.rs
use crate::flatten_utils::{FlatRecord, CATEGORICAL_FIELDS};
use csv::Writer;
use regex::Regex;
use std::collections::HashMap;
use std::error::Error;

/// Scholarship labels counted as "becado" in the KPI summary.
pub const SCHOLARSHIP_LABELS: [&str; 2] = ["Institucional", "Oficial"];

/// Headline numbers for the whole population.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSummary {
    pub total: usize,
    pub desertores: usize,
    pub tasa_desercion: f64,
    pub promedio_general: f64,
    pub becados: usize,
}

/// One slice of an attrition breakdown: a categorical label with its headcount,
/// dropout count and dropout rate in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceStat {
    pub label: String,
    pub total: usize,
    pub desertores: usize,
    pub tasa: f64,
}

/// Dropout vs non-dropout counts over a (possibly filtered) selection.
#[derive(Debug, Clone, PartialEq)]
pub struct AttritionDistribution {
    pub total: usize,
    pub desertores: usize,
    pub no_desertores: usize,
    pub tasa: f64,
}

fn rate_percent(desertores: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (desertores as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

/// Computes the KPI header of the dashboard: headcount, attrition rate, mean
/// cumulative average and scholarship-holder count.
pub fn summarize(records: &[FlatRecord]) -> PopulationSummary {
    let total = records.len();
    let desertores = records.iter().filter(|r| r.desertor == 1).count();
    let promedio_general = if total == 0 {
        0.0
    } else {
        records.iter().map(|r| r.promedio).sum::<f64>() / total as f64
    };
    let becados = records
        .iter()
        .filter(|r| SCHOLARSHIP_LABELS.contains(&r.becado.as_str()))
        .count();
    PopulationSummary {
        total,
        desertores,
        tasa_desercion: rate_percent(desertores, total),
        promedio_general,
        becados,
    }
}

/// Attrition rate sliced by one categorical dimension. Slices are ordered by
/// headcount descending, label ascending on ties. Unknown dimensions are an error,
/// not an empty result.
pub fn attrition_by(
    records: &[FlatRecord],
    dimension: &str,
) -> Result<Vec<SliceStat>, Box<dyn Error>> {
    if !CATEGORICAL_FIELDS.contains(&dimension) {
        return Err(format!("'{}' is not a categorical dimension", dimension).into());
    }

    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for record in records {
        let label = record
            .categorical_value(dimension)
            .unwrap_or_default()
            .to_string();
        let entry = counts.entry(label).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += usize::from(record.desertor == 1);
    }

    let mut slices: Vec<SliceStat> = counts
        .into_iter()
        .map(|(label, (total, desertores))| SliceStat {
            label,
            total,
            desertores,
            tasa: rate_percent(desertores, total),
        })
        .collect();
    slices.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.label.cmp(&b.label)));
    Ok(slices)
}

/// Per-department attrition for the local population (`es_colombia == 1`).
pub fn departamento_slices(records: &[FlatRecord]) -> Result<Vec<SliceStat>, Box<dyn Error>> {
    let locales: Vec<FlatRecord> = records
        .iter()
        .filter(|r| r.es_colombia == 1)
        .cloned()
        .collect();
    attrition_by(&locales, "departamento")
}

/// Per-country attrition for the international population (`es_colombia == 0`).
pub fn pais_slices(records: &[FlatRecord]) -> Result<Vec<SliceStat>, Box<dyn Error>> {
    let internacionales: Vec<FlatRecord> = records
        .iter()
        .filter(|r| r.es_colombia == 0)
        .cloned()
        .collect();
    attrition_by(&internacionales, "pais")
}

/// Multi-select filters mirroring the dashboard controls. An empty list means the
/// dimension is unconstrained.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub estratos: Vec<i64>,
    pub generos: Vec<String>,
    pub becados: Vec<String>,
    pub periodos: Vec<String>,
}

impl RecordFilter {
    pub fn apply<'a>(&self, records: &'a [FlatRecord]) -> Vec<&'a FlatRecord> {
        records
            .iter()
            .filter(|r| {
                (self.estratos.is_empty() || self.estratos.contains(&(r.estrato as i64)))
                    && (self.generos.is_empty() || self.generos.contains(&r.genero))
                    && (self.becados.is_empty() || self.becados.contains(&r.becado))
                    && (self.periodos.is_empty() || self.periodos.contains(&r.periodo))
            })
            .collect()
    }
}

/// Validates an academic-period code (`YYYYTT`, e.g. `202410`).
pub fn is_period_code(code: &str) -> bool {
    // Unwrap is safe on a literal pattern.
    let re = Regex::new(r"^\d{4}(10|30|60)$").unwrap();
    re.is_match(code)
}

/// Dropout distribution over a filtered selection. `None` signals an empty selection
/// so the caller renders an explicit "no data" state instead of a zero-division.
pub fn attrition_distribution(selection: &[&FlatRecord]) -> Option<AttritionDistribution> {
    if selection.is_empty() {
        return None;
    }
    let total = selection.len();
    let desertores = selection.iter().filter(|r| r.desertor == 1).count();
    Some(AttritionDistribution {
        total,
        desertores,
        no_desertores: total - desertores,
        tasa: rate_percent(desertores, total),
    })
}

/// Writes the flat population as CSV with the full fixed column set, one row per
/// student, failure-by-department serialized as a JSON cell.
pub fn export_csv(records: &[FlatRecord], file_path: &str) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_path(file_path)?;
    wtr.write_record([
        "id",
        "edad",
        "genero",
        "estrato",
        "discapacidad",
        "programa",
        "segundo_programa",
        "tiene_segundo_programa",
        "semestre_actual",
        "tipo_estudiante",
        "tipo_admision",
        "estado_academico",
        "ciudad",
        "departamento",
        "pais",
        "es_barranquilla",
        "es_colombia",
        "tipo_colegio",
        "calendario",
        "icfes_matematicas",
        "icfes_lectura",
        "icfes_ciencias",
        "icfes_sociales",
        "icfes_ingles",
        "icfes_total",
        "promedio",
        "materias_cursadas",
        "materias_perdidas",
        "materias_repetidas",
        "perdidas_por_departamento",
        "becado",
        "graduado",
        "desertor",
        "periodo",
    ])?;
    for r in records {
        wtr.write_record([
            r.id.clone(),
            r.edad.to_string(),
            r.genero.clone(),
            r.estrato.to_string(),
            r.discapacidad.to_string(),
            r.programa.clone(),
            r.segundo_programa.clone(),
            r.tiene_segundo_programa.to_string(),
            r.semestre_actual.to_string(),
            r.tipo_estudiante.clone(),
            r.tipo_admision.clone(),
            r.estado_academico.clone(),
            r.ciudad.clone(),
            r.departamento.clone(),
            r.pais.clone(),
            r.es_barranquilla.to_string(),
            r.es_colombia.to_string(),
            r.tipo_colegio.clone(),
            r.calendario.clone(),
            r.icfes_matematicas.to_string(),
            r.icfes_lectura.to_string(),
            r.icfes_ciencias.to_string(),
            r.icfes_sociales.to_string(),
            r.icfes_ingles.to_string(),
            r.icfes_total.to_string(),
            r.promedio.to_string(),
            r.materias_cursadas.to_string(),
            r.materias_perdidas.to_string(),
            r.materias_repetidas.to_string(),
            serde_json::to_string(&r.perdidas_por_departamento)?,
            r.becado.clone(),
            r.graduado.to_string(),
            r.desertor.to_string(),
            r.periodo.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten_utils::flatten_raw_documents;
    use serde_json::json;

    fn population() -> Vec<FlatRecord> {
        let values = vec![
            json!({
                "_id": "est-001",
                "datos_personales": {"genero": "F", "estrato": 2},
                "location": {"departamento": "Atlantico", "pais": "Colombia", "es_colombia": 1},
                "metricas_rendimiento": {"promedio_acumulado": 4.0},
                "estado": {"becado": "Institucional", "desertor": 0},
                "periodo_info": {"ultimo_periodo": 202410}
            }),
            json!({
                "_id": "est-002",
                "datos_personales": {"genero": "M", "estrato": 3},
                "location": {"departamento": "Atlantico", "pais": "Colombia", "es_colombia": 1},
                "metricas_rendimiento": {"promedio_acumulado": 3.0},
                "estado": {"desertor": 1},
                "periodo_info": {"ultimo_periodo": 202410}
            }),
            json!({
                "_id": "est-003",
                "datos_personales": {"genero": "F", "estrato": 2},
                "location": {"departamento": "Bolivar", "pais": "Colombia", "es_colombia": 1},
                "metricas_rendimiento": {"promedio_acumulado": 3.5},
                "estado": {"becado": "Oficial", "desertor": 0},
                "periodo_info": {"ultimo_periodo": 202430}
            }),
            json!({
                "_id": "est-004",
                "datos_personales": {"genero": "M", "estrato": 4},
                "location": {"pais": "Ecuador", "es_colombia": 0},
                "metricas_rendimiento": {"promedio_acumulado": 3.1},
                "estado": {"desertor": 1},
                "periodo_info": {"ultimo_periodo": 202430}
            }),
        ];
        flatten_raw_documents(&values).records
    }

    #[test]
    fn summary_kpis_match_hand_counts() {
        let summary = summarize(&population());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.desertores, 2);
        assert_eq!(summary.tasa_desercion, 50.0);
        assert!((summary.promedio_general - 3.4).abs() < 1e-9);
        assert_eq!(summary.becados, 2);
    }

    #[test]
    fn slices_sort_by_headcount_then_label() {
        let slices = attrition_by(&population(), "departamento").unwrap();
        assert_eq!(slices[0].label, "Atlantico");
        assert_eq!(slices[0].total, 2);
        assert_eq!(slices[0].tasa, 50.0);
        // "" (the international student's defaulted department) and "Bolivar" both
        // have one record; empty string sorts first.
        assert_eq!(slices[1].label, "");
        assert_eq!(slices[2].label, "Bolivar");
    }

    #[test]
    fn geographic_splits_partition_on_the_home_country_flag() {
        let records = population();
        let local = departamento_slices(&records).unwrap();
        assert_eq!(local.iter().map(|s| s.total).sum::<usize>(), 3);
        let international = pais_slices(&records).unwrap();
        assert_eq!(international.len(), 1);
        assert_eq!(international[0].label, "Ecuador");
        assert_eq!(international[0].tasa, 100.0);
    }

    #[test]
    fn unknown_dimension_is_an_error() {
        assert!(attrition_by(&population(), "promedio").is_err());
    }

    #[test]
    fn filters_compose_and_empty_lists_are_unconstrained() {
        let records = population();
        let filter = RecordFilter {
            estratos: vec![2],
            generos: vec!["F".to_string()],
            ..RecordFilter::default()
        };
        let selected = filter.apply(&records);
        assert_eq!(selected.len(), 2);

        let all = RecordFilter::default().apply(&records);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn empty_selection_yields_an_explicit_none() {
        let records = population();
        let filter = RecordFilter {
            periodos: vec!["209910".to_string()],
            ..RecordFilter::default()
        };
        let selected = filter.apply(&records);
        assert!(attrition_distribution(&selected).is_none());

        let dist = attrition_distribution(&RecordFilter::default().apply(&records)).unwrap();
        assert_eq!(dist.desertores + dist.no_desertores, dist.total);
        assert_eq!(dist.tasa, 50.0);
    }

    #[test]
    fn period_codes_validate() {
        assert!(is_period_code("202410"));
        assert!(is_period_code("202430"));
        assert!(!is_period_code("2024"));
        assert!(!is_period_code("202499"));
    }

    #[test]
    fn csv_export_writes_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poblacion.csv");
        let records = population();
        export_csv(&records, path.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), records.len() + 1);
        assert!(lines[0].starts_with("id,edad,genero"));
        assert!(lines[1].contains("est-001"));
    }
}
