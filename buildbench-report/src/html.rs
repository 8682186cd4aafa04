//! HTML Output
//!
//! A single self-contained page: the full report JSON is embedded, chart
//! series are precomputed here and drawn client-side with Chart.js.

use crate::format::{format_bytes, format_duration_ms, format_signed_bytes};
use crate::report::ComparisonReport;
use serde::Serialize;

const CHART_JS_URL: &str = "https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.min.js";

/// Timeline of one system's representative run; x is seconds since the first sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSeries {
    /// System name
    pub system: String,
    /// `[seconds, value]` pairs
    pub points: Vec<[f64; 2]>,
}

/// Bundle bytes by file extension for one system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    /// System name
    pub system: String,
    /// File extensions, sorted
    pub labels: Vec<String>,
    /// Bytes per label
    pub bytes: Vec<u64>,
}

/// Chart series derived from a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    /// Measured systems in report order
    pub systems: Vec<String>,
    /// Mean build time per system
    pub mean_build_time_ms: Vec<f64>,
    /// RSS in MiB over time
    pub memory_series: Vec<TimelineSeries>,
    /// user + system CPU % over time
    pub cpu_series: Vec<TimelineSeries>,
    /// Chunk bytes by extension per system
    pub bundle_composition: Vec<Composition>,
    /// Cache size before the batch per system
    pub cache_before_bytes: Vec<u64>,
    /// Cache size after the batch per system
    pub cache_after_bytes: Vec<u64>,
}

fn relative_seconds(timestamp_ms: u64, origin_ms: u64) -> f64 {
    timestamp_ms.saturating_sub(origin_ms) as f64 / 1000.0
}

impl ChartData {
    /// Precompute every chart's series
    pub fn from_report(report: &ComparisonReport) -> Self {
        let results = &report.results;

        let memory_series = results
            .iter()
            .map(|r| {
                let timeline = r.representative_memory_timeline();
                let origin = timeline.first().map_or(0, |s| s.timestamp_ms);
                TimelineSeries {
                    system: r.system.clone(),
                    points: timeline
                        .iter()
                        .map(|s| {
                            [
                                relative_seconds(s.timestamp_ms, origin),
                                s.rss as f64 / (1024.0 * 1024.0),
                            ]
                        })
                        .collect(),
                }
            })
            .collect();

        let cpu_series = results
            .iter()
            .map(|r| {
                let timeline = r.representative_cpu_timeline();
                let origin = timeline.first().map_or(0, |s| s.timestamp_ms);
                TimelineSeries {
                    system: r.system.clone(),
                    points: timeline
                        .iter()
                        .map(|s| {
                            [
                                relative_seconds(s.timestamp_ms, origin),
                                s.user_pct + s.system_pct,
                            ]
                        })
                        .collect(),
                }
            })
            .collect();

        let bundle_composition = results
            .iter()
            .map(|r| {
                let (labels, bytes) = r
                    .bytes_by_extension()
                    .into_iter()
                    .map(|(ext, size)| (if ext.is_empty() { "other".to_string() } else { ext }, size))
                    .unzip();
                Composition {
                    system: r.system.clone(),
                    labels,
                    bytes,
                }
            })
            .collect();

        Self {
            systems: results.iter().map(|r| r.system.clone()).collect(),
            mean_build_time_ms: results.iter().map(|r| r.build_time_stats.mean).collect(),
            memory_series,
            cpu_series,
            bundle_composition,
            cache_before_bytes: results.iter().map(|r| r.cache_before.size_bytes).collect(),
            cache_after_bytes: results.iter().map(|r| r.cache_after.size_bytes).collect(),
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Serialize for a `<script>` body; `</` would close the tag early
fn script_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn summary_rows(report: &ComparisonReport) -> String {
    let mut rows = String::new();
    for result in &report.results {
        let stats = &result.build_time_stats;
        let speedup = report
            .summary
            .entries
            .iter()
            .find(|e| e.system == result.system)
            .map_or_else(|| "-".to_string(), |e| format!("{:.2}x", e.speedup));
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&result.system),
            format_duration_ms(stats.mean),
            format_duration_ms(stats.median),
            format_duration_ms(stats.std_dev),
            format_duration_ms(stats.min),
            format_duration_ms(stats.max),
            speedup,
            format_bytes(result.peak_memory().rss),
            format_bytes(result.dist_size_bytes),
            format_signed_bytes(result.cache_growth.size_bytes),
        ));
    }
    rows
}

fn failure_list(report: &ComparisonReport) -> String {
    if report.failures.is_empty() {
        return String::new();
    }
    let items: String = report
        .failures
        .iter()
        .map(|f| {
            format!(
                "<li><strong>{}</strong> ({}, {} attempts): {}</li>",
                escape_html(&f.system),
                escape_html(&f.kind),
                f.attempts,
                escape_html(&f.message)
            )
        })
        .collect();
    format!("<section class=\"failures\"><h2>Failures</h2><ul>{}</ul></section>", items)
}

/// Generate the single-file HTML dashboard
pub fn generate_html_report(report: &ComparisonReport) -> Result<String, serde_json::Error> {
    let charts = ChartData::from_report(report);
    let fastest = report
        .summary
        .fastest
        .as_deref()
        .map(|s| format!("<p class=\"fastest\">Fastest: <strong>{}</strong></p>", escape_html(s)))
        .unwrap_or_default();
    let subtitle = format!(
        "{} &middot; {} ({} cores) &middot; {} iterations &middot; {}",
        report.meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        escape_html(&report.meta.system.cpu),
        report.meta.system.cpu_cores,
        report.meta.config.iterations,
        report
            .meta
            .git_commit
            .as_deref()
            .map(|c| escape_html(&c[..c.len().min(12)]))
            .unwrap_or_else(|| "no git".to_string()),
    );

    let rows = summary_rows(report);
    let failures = failure_list(report);
    let charts = script_json(&charts)?;
    let data = script_json(report)?;

    Ok(render(TEMPLATE, |name| match name {
        "CHART_JS" => Some(CHART_JS_URL),
        "SUBTITLE" => Some(subtitle.as_str()),
        "FASTEST" => Some(fastest.as_str()),
        "ROWS" => Some(rows.as_str()),
        "FAILURES" => Some(failures.as_str()),
        "CHARTS" => Some(charts.as_str()),
        "REPORT" => Some(data.as_str()),
        _ => None,
    }))
}

/// Fill `{{NAME}}` placeholders in one pass over the template.
///
/// Substituted text is never scanned again, so values may contain `{{`.
/// Unknown names are left as written.
fn render<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after
            .find("}}")
            .and_then(|close| value(&after[..close]).map(|v| (close, v)))
        {
            Some((close, v)) => {
                out.push_str(v);
                rest = &after[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Build Comparison</title>
<script src="{{CHART_JS}}"></script>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }
h1 { margin-bottom: 0.2rem; }
.subtitle { color: #666; margin-top: 0; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0 2rem; }
th, td { border-bottom: 1px solid #ddd; padding: 0.4rem 0.6rem; text-align: right; }
th:first-child, td:first-child { text-align: left; }
.grid { display: grid; grid-template-columns: 1fr 1fr; gap: 2rem; }
.failures { background: #fff3f3; border: 1px solid #e0b4b4; padding: 0.5rem 1rem; }
.doughnuts { display: flex; gap: 2rem; flex-wrap: wrap; }
.doughnuts figure { width: 300px; margin: 0; }
</style>
</head>
<body>
<h1>Build Comparison</h1>
<p class="subtitle">{{SUBTITLE}}</p>
{{FASTEST}}
{{FAILURES}}
<table>
<thead><tr><th>System</th><th>Mean</th><th>Median</th><th>Std dev</th><th>Min</th><th>Max</th><th>Speedup</th><th>Peak RSS</th><th>Dist size</th><th>Cache growth</th></tr></thead>
<tbody>
{{ROWS}}</tbody>
</table>
<div class="grid">
<figure><canvas id="build-time"></canvas></figure>
<figure><canvas id="cache"></canvas></figure>
<figure><canvas id="memory"></canvas></figure>
<figure><canvas id="cpu"></canvas></figure>
</div>
<h2>Bundle composition</h2>
<div class="doughnuts" id="composition"></div>
<script id="report-data" type="application/json">{{REPORT}}</script>
<script>
const CHARTS = {{CHARTS}};
const line = (series) => series.map((s) => ({
  label: s.system,
  data: s.points.map(([x, y]) => ({ x, y })),
  pointRadius: 0,
  borderWidth: 1.5,
}));
new Chart(document.getElementById('build-time'), {
  type: 'bar',
  data: { labels: CHARTS.systems, datasets: [{ label: 'Mean build time (ms)', data: CHARTS.mean_build_time_ms }] },
});
new Chart(document.getElementById('cache'), {
  type: 'bar',
  data: {
    labels: CHARTS.systems,
    datasets: [
      { label: 'Cache before (bytes)', data: CHARTS.cache_before_bytes },
      { label: 'Cache after (bytes)', data: CHARTS.cache_after_bytes },
    ],
  },
});
new Chart(document.getElementById('memory'), {
  type: 'line',
  data: { datasets: line(CHARTS.memory_series) },
  options: { plugins: { title: { display: true, text: 'RSS (MiB)' } }, scales: { x: { type: 'linear', title: { display: true, text: 's' } } } },
});
new Chart(document.getElementById('cpu'), {
  type: 'line',
  data: { datasets: line(CHARTS.cpu_series) },
  options: { plugins: { title: { display: true, text: 'CPU (%)' } }, scales: { x: { type: 'linear', title: { display: true, text: 's' } } } },
});
for (const c of CHARTS.bundle_composition) {
  const figure = document.createElement('figure');
  const canvas = document.createElement('canvas');
  figure.appendChild(canvas);
  document.getElementById('composition').appendChild(figure);
  new Chart(canvas, {
    type: 'doughnut',
    data: { labels: c.labels, datasets: [{ data: c.bytes }] },
    options: { plugins: { title: { display: true, text: c.system } } },
  });
}
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SystemFailure;
    use crate::report::fixtures::{report, result};

    #[test]
    fn test_chart_data() {
        let charts = ChartData::from_report(&report(
            vec![result("vite", &[100, 120]), result("webpack", &[90, 95])],
            Vec::new(),
        ));

        assert_eq!(charts.systems, vec!["vite", "webpack"]);
        assert_eq!(charts.mean_build_time_ms, vec![110.0, 92.5]);
        assert_eq!(charts.memory_series[0].points.len(), 2);
        assert_eq!(charts.memory_series[0].points[0][0], 0.0);
        assert!((charts.memory_series[0].points[1][0] - 0.01).abs() < 1e-9);
        assert_eq!(charts.bundle_composition[0].labels, vec!["css", "js"]);
        assert_eq!(charts.bundle_composition[0].bytes, vec![300, 1200]);
        assert_eq!(charts.cache_after_bytes, vec![2048, 2048]);
    }

    #[test]
    fn test_html_embeds_data() {
        let html =
            generate_html_report(&report(vec![result("vite", &[100, 120])], Vec::new())).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("chart.umd.min.js"));
        assert!(html.contains("\"systems\":[\"vite\"]"));
        assert!(html.contains("<td>vite</td>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_html_escapes_names() {
        let html = generate_html_report(&report(
            vec![result("</script><b>", &[100])],
            Vec::new(),
        ))
        .unwrap();
        assert!(!html.contains("</script><b>"));
        assert!(html.contains("&lt;/script&gt;&lt;b&gt;"));
    }

    #[test]
    fn test_placeholder_text_in_values_is_not_substituted() {
        let failure = SystemFailure {
            system: "{{ROWS}}".to_string(),
            kind: "build-failed".to_string(),
            message: "missing {{REPORT}}".to_string(),
            attempts: 1,
        };
        let html = generate_html_report(&report(
            vec![result("{{CHARTS}}", &[100])],
            vec![failure],
        ))
        .unwrap();

        assert_eq!(html.matches("\"schema_version\"").count(), 1);
        assert_eq!(html.matches("const CHARTS = {").count(), 1);
        assert!(html.contains("<td>{{CHARTS}}</td>"));
        assert!(html.contains("missing {{REPORT}}"));
    }

    #[test]
    fn test_render() {
        let value = |name: &str| match name {
            "A" => Some("{{B}}"),
            "B" => Some("b"),
            _ => None,
        };
        assert_eq!(render("x{{A}}y{{B}}", value), "x{{B}}yb");
        assert_eq!(render("{{C}} {{ {{B}}", value), "{{C}} {{ b");
        assert_eq!(render("open {{A", value), "open {{A");
    }
}
