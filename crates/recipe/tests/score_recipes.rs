use pretty_assertions::assert_eq;
use std::fs;
use survey_recipe::{
    evaluate, EvalOptions, RecipeError, RecipeLibrary, ResponseRow, ScoreValue,
};
use tempfile::tempdir;

const PSS: &str = r#"{
  "Kind": "survey",
  "RecipeVersion": "1.0",
  "Survey": {"TaskName": "PSS"},
  "Transforms": {
    "Invert": {"Items": ["q1"], "Scale": {"min": 1, "max": 5}},
    "Derived": [
      {"Name": "positive", "Method": "mean", "Items": ["q2", "q3"]}
    ]
  },
  "Scores": [
    {"Name": "inverted", "Method": "sum", "Items": ["q1"]},
    {"Name": "total", "Method": "sum", "Items": ["q1", "q2", "q3"], "Missing": "require_all",
     "Range": {"min": 3, "max": 15}},
    {"Name": "balance", "Method": "formula", "Items": ["q1", "positive"],
     "Formula": "({q1} - {positive}) / 2"},
    {"Name": "level", "Method": "map", "Source": "q1",
     "Mapping": {"1-2": "low", "3": "mid", "4-5": "high"}}
  ]
}"#;

#[test]
fn end_to_end_scoring_with_inversion() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("pss.json"), PSS).unwrap();

    let library = RecipeLibrary::load(dir.path()).unwrap();
    let recipe = library.get("pss").unwrap();

    let rows = vec![
        ResponseRow::new("sub-01")
            .with("q1", 2.0)
            .with("q2", "3")
            .with("q3", 4.0),
        ResponseRow::new("sub-02").with("q1", "NA").with("q2", 5.0),
    ];
    let table = evaluate(recipe, &rows, &EvalOptions::default());

    assert_eq!(table.get("sub-01", "inverted"), Some(&ScoreValue::Number(4.0)));
    assert_eq!(table.get("sub-01", "total"), Some(&ScoreValue::Number(11.0)));
    assert_eq!(table.get("sub-01", "balance"), Some(&ScoreValue::Number(0.25)));
    assert_eq!(
        table.get("sub-01", "level"),
        Some(&ScoreValue::Text("high".into()))
    );

    assert_eq!(
        table.to_tsv("participant_id", "n/a").unwrap(),
        "participant_id\tinverted\ttotal\tbalance\tlevel\n\
         sub-01\t4\t11\t0.25\thigh\n\
         sub-02\tn/a\tn/a\t-2.5\tn/a\n"
    );

    let sidecar = recipe.sidecar();
    assert_eq!(sidecar["total"]["Missing"], "require_all");
    assert_eq!(sidecar["balance"]["Formula"], "({q1} - {positive}) / 2");
}

#[test]
fn invalid_recipe_blocks_the_whole_library() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("pss.json"), PSS).unwrap();
    fs::write(
        dir.path().join("bad.json"),
        r#"{"Kind": "survey", "RecipeVersion": "1", "Survey": {"TaskName": "bad"},
            "Scores": [{"Name": "s", "Method": "formula", "Items": ["a"], "Formula": "{a}+{b}"}]}"#,
    )
    .unwrap();

    let err = RecipeLibrary::load(dir.path()).unwrap_err();
    let RecipeError::Invalid { issues } = &err else {
        panic!("expected validation failure, got {err}");
    };
    assert_eq!(issues.len(), 1);
    assert!(issues[0].to_string().ends_with("Formula placeholder '{b}' is not listed in Items"));
}
