use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use survey_library::{LibraryError, LibraryIndex, LibraryRoots, TemplateKind, TemplateSource};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

const PANAS: &str = r#"{
  "Study": {"ShortName": "PANAS"},
  "PANAS01": {"Description": "interested"},
  "PANAS02": {"Description": "distressed"}
}"#;

#[test]
fn loads_global_and_project_scopes() {
    let global = tempdir().unwrap();
    let project = tempdir().unwrap();
    write(global.path(), "affect/survey-panas.json", PANAS);
    write(
        global.path(),
        "biometrics-grip.json",
        r#"{"grip_left": {}, "grip_right": {}}"#,
    );
    write(
        global.path(),
        "participants.json",
        r#"{"participant_id": {}, "age": {}, "sex": {}}"#,
    );
    write(global.path(), "survey-broken.json", "{ not json");
    write(project.path(), "survey-panas.json", PANAS);

    let roots = LibraryRoots::global(global.path()).with_project(project.path());
    let (index, report) = LibraryIndex::load(&roots).unwrap();

    assert_eq!(report.loaded, 4);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].path.ends_with("survey-broken.json"));

    assert_eq!(index.len(), 3);
    let sources: Vec<_> = index
        .all()
        .filter(|e| e.key == "panas")
        .map(|e| e.source)
        .collect();
    assert_eq!(sources, vec![TemplateSource::Global, TemplateSource::Project]);
    assert_eq!(index.get("grip").unwrap().kind, TemplateKind::Biometrics);

    let participants = index.participants().unwrap();
    assert_eq!(participants.signature().len(), 3);
}

#[test]
fn missing_root_aborts_the_load() {
    let roots = LibraryRoots::global("/definitely/not/here");
    let err = LibraryIndex::load(&roots).unwrap_err();
    assert!(matches!(err, LibraryError::MissingRoot(_)));
}

#[test]
fn ambiguous_alias_across_roots_aborts_the_load() {
    let global = tempdir().unwrap();
    let project = tempdir().unwrap();
    write(
        global.path(),
        "survey-a.json",
        r#"{"A1": {"Aliases": ["common_item"]}}"#,
    );
    write(
        project.path(),
        "survey-b.json",
        r#"{"B1": {"Aliases": ["COMMON-ITEM"]}}"#,
    );

    let roots = LibraryRoots::global(global.path()).with_project(project.path());
    let err = LibraryIndex::load(&roots).unwrap_err();
    assert!(
        matches!(err, LibraryError::AmbiguousAlias { ref first, ref second, .. } if first == "a" && second == "b"),
        "{err}"
    );
}

#[test]
fn alias_shadowing_an_item_code_aborts_the_load() {
    let global = tempdir().unwrap();
    let project = tempdir().unwrap();
    write(
        global.path(),
        "survey-stai.json",
        r#"{"STAI1": {"Aliases": ["anx_1"]}, "STAI2": {}}"#,
    );
    write(project.path(), "survey-anx.json", r#"{"ANX1": {}, "ANX2": {}}"#);

    let roots = LibraryRoots::global(global.path()).with_project(project.path());
    let err = LibraryIndex::load(&roots).unwrap_err();
    assert!(
        matches!(err, LibraryError::AmbiguousAlias { ref alias, ref first, ref second }
            if alias == "anx1" && first == "stai" && second == "anx"),
        "{err}"
    );
}

#[test]
fn item_code_claimed_as_alias_later_aborts_the_load() {
    let global = tempdir().unwrap();
    write(global.path(), "survey-anx.json", r#"{"ANX1": {}, "ANX2": {}}"#);
    write(
        global.path(),
        "survey-stai.json",
        r#"{"STAI1": {"Aliases": ["anx_1"]}, "STAI2": {}}"#,
    );

    let err = LibraryIndex::load(&LibraryRoots::global(global.path())).unwrap_err();
    assert!(err.is_fatal());
    assert!(
        matches!(err, LibraryError::AmbiguousAlias { ref first, ref second, .. }
            if first == "anx" && second == "stai"),
        "{err}"
    );
}
