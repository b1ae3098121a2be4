use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use generator::{
    Configuration, DocumentError, EngineError, EngineResult, MasterSpec, PreparedTarget, Study,
    StudyOptions, StudyReport, merge, render_block, resolve_target,
};
use indexmap::IndexMap;
use studygen::parser::Parser;
use studygen::{Block, Catalog, TypeName};

const CATALOG: &str = r#"
# multiply

Multiply two numbers.

- params: `a: float` `b: float`
- returns: `float`

```python
return a * b
```

# add

- params: `a: float` `b: float`
- returns: `float`

```python
return a + b
```

# power

- params: `x: float` `y: float`
- returns: `float`

```python
return x**y
```

# truncate

- params: `x: int`
- returns: `int`

```python
return x
```

# sort_in_place

- params: `data: list` `reverse: bool`
- returns: `list`

```python
data.sort(reverse=reverse)
return data
```

# square

- params: `x: float`
- returns: `float`
- depends: `multiply`

```python
return multiply(x, x)
```

# cube

- params: `x: float`
- returns: `float`
- depends: `square`

```python
return square(x) * x
```

# relay

- depends: `orphan`

```python
return orphan()
```

# plot

- params: `x: float`
- import: `plt` `import matplotlib.pyplot as plt`

```python
plt.plot(x)
```

# plot_again

- params: `x: float`
- import: `plt` `import pylab as plt`

```python
plt.plot(x)
```

# orphan

- depends: `missing_helper`

```python
return None
```
"#;

const MULTIPLY_ADD: &str = "
gen:
  script:
    multiply: {args: [b, c], output: bc}
    add: {args: [a, bc], output: result}
  output: result
";

fn catalog() -> Catalog {
    Parser::new(CATALOG.to_string(), 0)
        .parse()
        .expect("catalog parse failed")
}

fn master(yaml: &str) -> MasterSpec {
    MasterSpec::from_yaml(yaml, Path::new("master.yaml")).expect("master parse failed")
}

fn configuration(yaml: &str) -> Configuration {
    Configuration::from_yaml(yaml, Path::new("config.yaml")).expect("config parse failed")
}

fn prepare(yaml: &str, target: &str) -> EngineResult<PreparedTarget> {
    let master = master(yaml);
    resolve_target(&catalog(), target, &master.targets[target])
}

fn try_run(yaml: &str, config: &str, root: &Path) -> EngineResult<StudyReport> {
    let catalog = catalog();
    let master = master(yaml);
    let configuration = configuration(config);
    Study::new(&catalog, &master, &configuration)
        .expect("default template")
        .with_options(StudyOptions {
            output_root: root.to_path_buf(),
            ..StudyOptions::default()
        })
        .run()
}

fn run(yaml: &str, config: &str, root: &Path) -> StudyReport {
    try_run(yaml, config, root).expect("study planning failed")
}

fn bound(name: &str, args: &[&str], outputs: &[&str]) -> Block {
    catalog()
        .get(name)
        .expect("block in catalog")
        .clone()
        .with_argument_names(args)
        .expect("argument binding")
        .with_output_names(outputs)
        .expect("output binding")
}

fn names(block: &Block) -> BTreeSet<&str> {
    block.parameter_names().into_iter().collect()
}

// ---------------------------------------------------------------------------
// Merge engine
// ---------------------------------------------------------------------------

#[test]
fn multiply_then_add() {
    let target = prepare(MULTIPLY_ADD, "gen").unwrap();
    assert_eq!(names(&target.main), BTreeSet::from(["a", "b", "c"]));
    assert_eq!(
        render_block(&target.main),
        "def main(b: float, c: float, a: float) -> float:\n    bc = multiply(b, c)\n    result = add(a, bc)\n    return result\n"
    );
    assert_eq!(target.registry.names().collect::<Vec<_>>(), ["multiply", "add"]);
}

#[test]
fn parameter_union_is_order_independent() {
    let multiply = bound("multiply", &["b", "c"], &["bc"]);
    let add = bound("add", &["a", "bc"], &["result"]);
    let none = IndexMap::new();

    let forward = merge(&[multiply.clone(), add.clone()], "m", "", &none).unwrap();
    let backward = merge(&[add, multiply], "m", "", &none).unwrap();
    assert_eq!(names(&forward), names(&backward));
}

#[test]
fn conflicting_types_fail_in_either_order() {
    let float_x = bound("power", &["x", "y"], &["p"]);
    let int_x = bound("truncate", &["x"], &["t"]);
    let none = IndexMap::new();

    for blocks in [[float_x.clone(), int_x.clone()], [int_x, float_x]] {
        let err = merge(&blocks, "m", "", &none).unwrap_err();
        assert!(matches!(err, EngineError::SignatureConflict { ref parameter, .. } if parameter == "x"));
        assert!(err.to_string().starts_with("signature conflict"));
    }
}

#[test]
fn conflicting_types_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
gen:
  script:
    power: {args: [x, y]}
    truncate: {args: [x]}
";
    let report = run(yaml, "x: 1\ny: 2\n", dir.path());
    assert!(report.artifacts.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].error, EngineError::SignatureConflict { .. }));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn requested_outputs_must_be_reachable() {
    let multiply = bound("multiply", &["b", "c"], &["bc"]);
    let mut requested = IndexMap::new();
    requested.insert("bc".to_string(), None);
    let merged = merge(std::slice::from_ref(&multiply), "m", "", &requested).unwrap();
    assert_eq!(merged.outputs()["bc"], TypeName::new("float"));

    requested.insert("nowhere".to_string(), None);
    assert_eq!(
        merge(&[multiply], "m", "", &requested).unwrap_err(),
        EngineError::UnreachableOutput {
            block: "m".into(),
            output: "nowhere".into(),
        }
    );
}

#[test]
fn plain_inputs_are_not_outputs() {
    let multiply = bound("multiply", &["b", "c"], &["bc"]);
    let add = bound("add", &["a", "bc"], &["result"]);
    let mut requested = IndexMap::new();
    requested.insert("a".to_string(), None);
    assert_eq!(
        merge(&[multiply, add], "m", "", &requested).unwrap_err(),
        EngineError::UnreachableOutput {
            block: "m".into(),
            output: "a".into(),
        }
    );
}

#[test]
fn in_place_outputs_stay_parameters() {
    let sort = bound("sort_in_place", &["data", "reverse"], &["data"]);
    let mut requested = IndexMap::new();
    requested.insert("data".to_string(), None);
    let merged = merge(&[sort], "m", "", &requested).unwrap();
    assert_eq!(merged.parameter_names(), ["data", "reverse"]);
    assert_eq!(merged.outputs()["data"], TypeName::new("list"));
}

#[test]
fn conflicting_imports_are_fatal() {
    let yaml = "
gen:
  script:
    plot:
    plot_again:
";
    assert!(matches!(
        prepare(yaml, "gen"),
        Err(EngineError::ImportConflict { ref module, .. }) if module == "plt"
    ));
}

// ---------------------------------------------------------------------------
// Registry & target resolution
// ---------------------------------------------------------------------------

#[test]
fn dependencies_are_pulled_transitively() {
    let target = prepare("gen:\n  script:\n    square: {args: [q]}\n", "gen").unwrap();
    assert_eq!(target.registry.names().collect::<Vec<_>>(), ["square", "multiply"]);
    assert_eq!(target.main.parameter_names(), ["q"]);
}

#[test]
fn dependency_chains_are_followed() {
    let target = prepare("gen:\n  script:\n    cube: {args: [q]}\n", "gen").unwrap();
    assert_eq!(
        target.registry.names().collect::<Vec<_>>(),
        ["cube", "square", "multiply"]
    );
}

#[test]
fn missing_dependency_deep_in_a_chain_is_fatal() {
    assert_eq!(
        prepare("gen:\n  script:\n    relay:\n", "gen").unwrap_err(),
        EngineError::MissingDependency {
            block: "orphan".into(),
            dependency: "missing_helper".into(),
        }
    );
}

#[test]
fn missing_dependency_is_fatal() {
    assert_eq!(
        prepare("gen:\n  script:\n    orphan:\n", "gen").unwrap_err(),
        EngineError::MissingDependency {
            block: "orphan".into(),
            dependency: "missing_helper".into(),
        }
    );
}

#[test]
fn unknown_block_is_fatal() {
    assert!(matches!(
        prepare("gen:\n  script:\n    divide:\n", "gen"),
        Err(EngineError::UnknownBlock { ref block, .. }) if block == "divide"
    ));
}

#[test]
fn new_block_cannot_shadow_a_registered_block() {
    let yaml = "
gen:
  script:
    square:
  new_blocks:
    multiply:
      script:
        add:
";
    assert_eq!(
        prepare(yaml, "gen").unwrap_err(),
        EngineError::DuplicateDefinition {
            block: "multiply".into(),
        }
    );
}

#[test]
fn new_blocks_with_repeated_calls() {
    let yaml = "
gen:
  script:
    power_twice:
  new_blocks:
    power_twice:
      script:
        power: {args: [x, y], output: x_y}
        power__2: {args: [x_y, y], output: x_y}
      output: x_y
      params: [y, x]
      docstring: Raise twice.
  output: x_y
";
    let target = prepare(yaml, "gen").unwrap();
    let composite = target.registry.get("power_twice").unwrap();
    assert_eq!(
        render_block(composite),
        "def power_twice(y: float, x: float) -> float:\n    \"\"\"Raise twice.\"\"\"\n    x_y = power(x, y)\n    x_y = power(x_y, y)\n    return x_y\n"
    );
    assert_eq!(
        render_block(&target.main),
        "def main(y: float, x: float) -> float:\n    x_y = power_twice(y, x)\n    return x_y\n"
    );
}

#[test]
fn new_block_params_must_match() {
    let yaml = "
gen:
  script:
    twice:
  new_blocks:
    twice:
      script:
        power: {args: [x, y], output: p}
      output: p
      params: [x]
";
    assert!(matches!(
        prepare(yaml, "gen"),
        Err(EngineError::Block(studygen::BlockError::ParameterMismatch { ref parameter, .. })) if parameter == "y"
    ));
}

#[test]
fn rename_arity_is_checked() {
    assert!(matches!(
        prepare("gen:\n  script:\n    add: {args: [a]}\n", "gen"),
        Err(EngineError::Block(studygen::BlockError::ArityMismatch { expected: 2, found: 1, .. }))
    ));
}

// ---------------------------------------------------------------------------
// Parameters, scans and output tree
// ---------------------------------------------------------------------------

#[test]
fn parameters_come_from_the_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(MULTIPLY_ADD, "inputs:\n  a: 2.0\n  b: 10.0\n  c: 4.0\n", dir.path());
    assert!(report.is_success());
    let text = fs::read_to_string(dir.path().join("gen.py")).unwrap();
    assert!(text.contains("# Declare parameters\nb = 10.0\nc = 4.0\na = 2.0\n"));
    assert!(text.contains("    main(b, c, a)"));
    assert_eq!(report.artifacts[0].text, text);
}

#[test]
fn missing_parameter_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(MULTIPLY_ADD, "a: 2.0\nb: 10.0\n", dir.path());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].error,
        EngineError::MissingParameter { parameter: "c".into() }
    );
}

#[test]
fn linspace_scan_directories() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
gen:
  script:
    add: {args: [q, q], output: total}
  scans:
    q: {linspace: [60.0, 62.0, 3]}
";
    let report = run(yaml, "", dir.path());
    assert!(report.is_success());
    let paths: Vec<PathBuf> = report.artifacts.iter().map(|a| a.path.clone()).collect();
    assert_eq!(
        paths,
        ["q_60.0", "q_61.0", "q_62.0"].map(|d| dir.path().join(d).join("gen.py"))
    );
    let text = fs::read_to_string(dir.path().join("q_61.0/gen.py")).unwrap();
    assert!(text.contains("q = 61.0\n"));
}

#[test]
fn scan_values_sharing_a_directory_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for scan in ["{linspace: [0.0, 0.000001, 3]}", "{list: [1.0, 2.0, 1.0]}"] {
        let yaml = format!(
            "
gen:
  script:
    add: {{args: [q, q], output: total}}
  scans:
    q: {}
",
            scan
        );
        assert!(matches!(
            try_run(&yaml, "", dir.path()),
            Err(EngineError::InvalidScan { ref parameter, .. }) if parameter == "q"
        ));
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn a_target_listed_twice_in_a_layer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
structure:
  layer_1:
    generations: [gen, gen]
gen:
  script:
    add: {args: [a, b], output: total}
";
    assert_eq!(
        try_run(yaml, "a: 1.0\nb: 2.0\n", dir.path()).unwrap_err(),
        EngineError::DuplicateOutput {
            target: "gen".into(),
            path: PathBuf::from("layer_1/gen"),
        }
    );
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn scan_overrides_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
gen:
  script:
    add: {args: [q, q], output: total}
  scans:
    q: {list: [2.5]}
";
    let report = run(yaml, "q: 1.0\n", dir.path());
    assert!(report.is_success());
    assert!(report.artifacts[0].text.contains("q = 2.5\n"));
}

#[test]
fn twin_values_are_locked_together() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
gen:
  script:
    plot: {args: [qx]}
  scans:
    qx: {list: [62.31, 62.32], for_each_beam: true}
";
    let report = run(yaml, "", dir.path());
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(report.artifacts[0].path, dir.path().join("qx_62.31/gen.py"));
    assert!(
        report.artifacts[1]
            .text
            .contains("qx = {\"lhcb1\": 62.32, \"lhcb2\": 62.32}\n")
    );
}

#[test]
fn scan_cardinality_is_the_product() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
structure:
  layer_1:
    generations: [gen]
    scans:
      a: {list: [1.0, 2.0]}
      b: {list: [3.0, 4.0, 5.0]}
gen:
  script:
    add: {args: [a, b], output: total}
";
    let report = run(yaml, "", dir.path());
    assert_eq!(report.artifacts.len(), 6);
    let distinct: BTreeSet<&PathBuf> = report.artifacts.iter().map(|a| &a.path).collect();
    assert_eq!(distinct.len(), 6);
    assert_eq!(
        report.artifacts[1].path,
        dir.path().join("layer_1/a_1.0_b_4.0/gen.py")
    );
}

#[test]
fn layers_nest_and_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
structure:
  layer_1:
    generations: [first]
    scans:
      a: {list: [1.0, 2.0]}
  layer_2:
    generations: [second]
second:
  script:
    add: {args: [a, b], output: total}
  scans:
    b: {list: [7.0]}
first:
  script:
    square: {args: [a]}
";
    let report = run(yaml, "", dir.path());
    assert!(report.is_success());
    let paths: Vec<PathBuf> = report.artifacts.iter().map(|a| a.path.clone()).collect();
    assert_eq!(
        paths,
        [
            "layer_1/a_1.0/first.py",
            "layer_1/a_2.0/first.py",
            "layer_1/a_1.0/layer_2/b_7.0/second.py",
            "layer_1/a_2.0/layer_2/b_7.0/second.py",
        ]
        .map(|p| dir.path().join(p))
    );
    assert!(report.artifacts[3].text.contains("a = 2.0\nb = 7.0\n"));
}

#[test]
fn generation_is_idempotent() {
    let yaml = "
gen:
  script:
    multiply: {args: [b, c], output: bc}
    add: {args: [a, bc], output: result}
  output: result
  scans:
    a: {linspace: [0.0, 1.0, 4]}
";
    let config = "b: 1.0\nc: 2.0\n";
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let one = run(yaml, config, first.path());
    let two = run(yaml, config, second.path());
    let texts = |report: &StudyReport| -> Vec<String> {
        report.artifacts.iter().map(|a| a.text.clone()).collect()
    };
    assert_eq!(texts(&one), texts(&two));

    let again = run(yaml, config, first.path());
    assert_eq!(texts(&one), texts(&again));
    let on_disk = fs::read_to_string(first.path().join("a_0.33333/gen.py")).unwrap();
    assert_eq!(on_disk, one.artifacts[1].text);
}

#[test]
fn a_failed_combination_leaves_its_siblings_alone() {
    let dir = tempfile::tempdir().unwrap();
    // A file where one combination's directory should go.
    fs::write(dir.path().join("q_2.0"), "blocked").unwrap();
    let yaml = "
gen:
  script:
    add: {args: [q, q], output: total}
  scans:
    q: {list: [1.0, 2.0, 3.0]}
";
    let report = run(yaml, "", dir.path());
    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].job.branch.describe_values(), "q=2.0");
    assert!(matches!(report.failures[0].error, EngineError::Io { .. }));
    assert!(dir.path().join("q_1.0/gen.py").exists());
    assert!(dir.path().join("q_3.0/gen.py").exists());
}

#[test]
fn a_failed_target_leaves_other_targets_alone() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = "
good:
  script:
    add: {args: [a, a], output: total}
bad:
  script:
    orphan:
";
    let report = run(yaml, "a: 1.0\n", dir.path());
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].target, "good");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].job.target, "bad");
}

#[test]
fn check_mode_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let master = master(MULTIPLY_ADD);
    let configuration = configuration("a: 1.0\nb: 2.0\nc: 3.0\n");
    let report = Study::new(&catalog, &master, &configuration)
        .unwrap()
        .with_options(StudyOptions {
            output_root: dir.path().to_path_buf(),
            write: false,
            ..StudyOptions::default()
        })
        .run()
        .unwrap();
    assert_eq!(report.artifacts.len(), 1);
    assert!(!dir.path().join("gen.py").exists());
}

#[test]
fn custom_template() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog();
    let master = master(MULTIPLY_ADD);
    let configuration = configuration("a: 1.0\nb: 2.0\nc: 3.0\n");
    let template = studygen::Template::parse("{{ parameters }}{{ main_call }}\n").unwrap();
    let report = Study::new(&catalog, &master, &configuration)
        .unwrap()
        .with_template(template)
        .with_options(StudyOptions {
            output_root: dir.path().to_path_buf(),
            extension: "txt".into(),
            ..StudyOptions::default()
        })
        .run()
        .unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("gen.txt")).unwrap(),
        "# Declare parameters\nb = 2.0\nc = 3.0\na = 1.0\nmain(b, c, a)\n"
    );
    assert!(report.is_success());
}

#[test]
fn duplicate_script_keys_are_ambiguous() {
    let yaml = "gen:\n  script:\n    add: {args: [a, b]}\n    add: {args: [c, d]}\n";
    let err = MasterSpec::from_yaml(yaml, Path::new("master.yaml")).unwrap_err();
    assert!(matches!(err, DocumentError::DuplicateKey { .. }));
}
