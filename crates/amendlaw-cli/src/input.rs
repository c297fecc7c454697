//! Loading Acts, amendments, ChangeSets and decisions from disk.

use std::path::Path;

use amendlaw_core::{
    Act, Amendment, ChangeId, ChangeSet, Decision, EngineConfig, ReviewState, SourceLine,
    infer_source_lines,
};
use anyhow::{Context, bail};
use serde::Deserialize;

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Load an Act from a saved Act JSON, a JSON array of ingestion lines, or
/// plain text with `--- PAGE n ---` markers.
pub fn load_act(path: &Path, act_id: Option<&str>) -> anyhow::Result<Act> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading act {}", path.display()))?;
    let act_id = act_id.map_or_else(|| stem(path), str::to_string);

    if !is_json(path) {
        let lines = infer_source_lines(&text);
        if lines.is_empty() {
            bail!("{} contains no text", path.display());
        }
        return Act::from_source_lines(act_id, lines)
            .with_context(|| format!("building act from {}", path.display()));
    }

    if let Ok(act) = serde_json::from_str::<Act>(&text) {
        act.validate()
            .with_context(|| format!("validating act {}", path.display()))?;
        return Ok(act);
    }
    let lines: Vec<SourceLine> = serde_json::from_str(&text)
        .with_context(|| format!("{} is neither an act nor a list of lines", path.display()))?;
    Act::from_source_lines(act_id, lines)
        .with_context(|| format!("building act from {}", path.display()))
}

/// Load an amendment from JSON or split plain text into spans.
pub fn load_amendment(path: &Path, amendment_id: Option<&str>) -> anyhow::Result<Amendment> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading amendment {}", path.display()))?;
    if is_json(path) {
        return serde_json::from_str(&text)
            .with_context(|| format!("parsing amendment {}", path.display()));
    }
    let id = amendment_id.map_or_else(|| stem(path), str::to_string);
    Ok(Amendment::from_text(id, &text))
}

pub fn load_changeset(path: &Path) -> anyhow::Result<ChangeSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading changeset {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing changeset {}", path.display()))
}

/// One reviewer decision as written in a decisions file.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionInput {
    pub change_id: ChangeId,
    pub decision: Decision,
    pub reviewer_id: String,
    #[serde(default = "pending")]
    pub expected_state: ReviewState,
    #[serde(default)]
    pub comment: Option<String>,
}

fn pending() -> ReviewState {
    ReviewState::Pending
}

pub fn load_decisions(path: &Path) -> anyhow::Result<Vec<DecisionInput>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading decisions {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing decisions {}", path.display()))
}

/// Engine configuration from an optional file, then CLI overrides.
pub fn load_config(path: Option<&Path>, coverage_threshold: Option<f64>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::from_json_file(p)
            .with_context(|| format!("loading config {}", p.display()))?,
        None => EngineConfig::default(),
    };
    match coverage_threshold {
        Some(t) => config
            .with_coverage_threshold(t)
            .context("applying --coverage-threshold"),
        None => Ok(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn plain_text_act_infers_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "sample.txt",
            "--- PAGE 1 ---\n15. Appeals.\n(1) Any person may appeal.\n(2) Within thirty days.\n",
        );
        let act = load_act(&path, None).unwrap();
        assert_eq!(act.act_id(), "sample");
        assert_eq!(act.len(), 3);
        assert_eq!(act.lines()[2].section_path.to_string(), "15(2)");
        assert_eq!(act.lines()[0].page, Some(1));
    }

    #[test]
    fn json_lines_and_saved_act_both_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "lines.json",
            r#"[{"text": "1. Title.", "section_path_hint": "1"}, {"text": "continued"}]"#,
        );
        let act = load_act(&path, Some("act-9")).unwrap();
        assert_eq!(act.act_id(), "act-9");
        assert_eq!(act.lines()[1].section_path.to_string(), "1");

        let saved = write(&dir, "act.json", &serde_json::to_string(&act).unwrap());
        let reloaded = load_act(&saved, None).unwrap();
        assert_eq!(reloaded, act);
    }

    #[test]
    fn decisions_default_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "decisions.json",
            r#"[{"change_id": "a@b v1#000", "decision": "accepted", "reviewer_id": "alice"}]"#,
        );
        let decisions = load_decisions(&path).unwrap();
        assert_eq!(decisions[0].expected_state, ReviewState::Pending);
        assert_eq!(decisions[0].decision, Decision::Accepted);
    }

    #[test]
    fn threshold_override_is_validated() {
        assert_eq!(load_config(None, Some(0.5)).unwrap().coverage_threshold, 0.5);
        assert!(load_config(None, Some(1.5)).is_err());
    }
}
