use std::cell::RefCell;
use std::path::{Path, PathBuf};

use wdeploy_lib::access::FileAccess;
use wdeploy_lib::deps::{GraphError, PipelineError, PipelineOptions, Transform, TransformError, check_dependencies};

use super::common::TestTree;

/// `.src` files whose `import NAME` lines are dependencies; outputs are
/// upper-cased copies under `out/`.
struct ImportTransform {
  out: PathBuf,
  updated: RefCell<Vec<String>>,
}

impl ImportTransform {
  fn new(tree: &TestTree) -> Self {
    Self {
      out: tree.path("out"),
      updated: RefCell::new(Vec::new()),
    }
  }

  fn take_updates(&self) -> Vec<String> {
    let mut updates = self.updated.take();
    updates.sort();
    updates
  }
}

impl Transform for ImportTransform {
  fn is_candidate(&self, full_path: &Path) -> bool {
    full_path.extension().is_some_and(|e| e == "src")
  }

  fn dependencies(&self, access: &FileAccess, full_path: &Path) -> Result<Vec<String>, TransformError> {
    let text = access.read_to_string(full_path)?;
    Ok(
      text
        .lines()
        .filter_map(|line| line.strip_prefix("import "))
        .map(|name| name.trim().to_string())
        .collect(),
    )
  }

  fn output_path(&self, relative_path: &Path) -> PathBuf {
    self.out.join(relative_path)
  }

  fn update(&self, access: &FileAccess, source: &Path, output: &Path) -> Result<(), TransformError> {
    let text = access.read_to_string(source)?;
    access.write(output, text.to_uppercase().as_bytes())?;
    let name = source.file_name().unwrap().to_string_lossy().into_owned();
    self.updated.borrow_mut().push(name);
    Ok(())
  }
}

fn chain() -> TestTree {
  let tree = TestTree::new();
  tree.write("src/a.src", "import b.src\nbody a");
  tree.write("src/b.src", "import c.src\nbody b");
  tree.write("src/c.src", "body c");
  for name in ["a", "b", "c"] {
    tree.touch(&format!("src/{name}.src"), 100);
  }
  tree
}

#[test]
fn regenerates_only_what_a_change_reaches() {
  let tree = chain();
  let access = FileAccess::unprivileged();
  let options = PipelineOptions::new(tree.path("src")).local_include(true);
  let transform = ImportTransform::new(&tree);

  // First run: no outputs yet.
  let outcome = check_dependencies(&access, &options, &transform).unwrap();
  assert_eq!(outcome.updated.len(), 3);
  assert_eq!(transform.take_updates(), ["a.src", "b.src", "c.src"]);
  assert_eq!(tree.read("out/a.src"), "IMPORT B.SRC\nBODY A");

  // Outputs exactly as old as the sources are fresh.
  for name in ["a", "b", "c"] {
    tree.touch(&format!("out/{name}.src"), 100);
  }
  let outcome = check_dependencies(&access, &options, &transform).unwrap();
  assert!(outcome.updated.is_empty());
  assert_eq!(outcome.outputs.len(), 3);

  // Touching the leaf reaches every importer.
  tree.touch("src/c.src", 200);
  check_dependencies(&access, &options, &transform).unwrap();
  assert_eq!(transform.take_updates(), ["a.src", "b.src", "c.src"]);

  // Touching the middle leaves the leaf alone.
  for name in ["a", "b", "c"] {
    tree.touch(&format!("out/{name}.src"), 250);
  }
  tree.touch("src/b.src", 300);
  check_dependencies(&access, &options, &transform).unwrap();
  assert_eq!(transform.take_updates(), ["a.src", "b.src"]);
}

#[test]
fn include_dirs_are_searched_before_the_local_directory() {
  let tree = TestTree::new();
  tree.write("src/page.src", "import shared.src");
  tree.write("src/shared.src", "local");
  tree.write("lib/shared.src", "library");
  let access = FileAccess::unprivileged();
  let options = PipelineOptions::new(tree.path("src"))
    .include_dirs(vec![tree.path("lib")])
    .local_include(true)
    .files(vec![PathBuf::from("page.src")]);
  let transform = ImportTransform::new(&tree);

  check_dependencies(&access, &options, &transform).unwrap();
  tree.touch("out/page.src", 100);
  tree.touch("src/page.src", 50);
  tree.touch("src/shared.src", 50);
  tree.touch("lib/shared.src", 500);

  let outcome = check_dependencies(&access, &options, &transform).unwrap();
  assert_eq!(outcome.updated, vec![tree.path("out/page.src")]);
}

#[test]
fn cycles_abort_the_run() {
  let tree = TestTree::new();
  tree.write("src/a.src", "import b.src");
  tree.write("src/b.src", "import a.src");
  let options = PipelineOptions::new(tree.path("src")).local_include(true);

  let err = check_dependencies(&FileAccess::unprivileged(), &options, &ImportTransform::new(&tree)).unwrap_err();

  assert!(matches!(
    err,
    PipelineError::Graph(GraphError::CircularDependency { .. })
  ));
  assert!(!tree.path("out").exists());
}

#[test]
fn missing_import_names_the_importer() {
  let tree = TestTree::new();
  tree.write("src/a.src", "import nowhere.src");
  let options = PipelineOptions::new(tree.path("src")).local_include(true);

  let err = check_dependencies(&FileAccess::unprivileged(), &options, &ImportTransform::new(&tree)).unwrap_err();

  assert_eq!(
    err.to_string(),
    "missing dependency: nowhere.src (required by a.src)"
  );
}

fn shadowed_candidate() -> TestTree {
  let tree = TestTree::new();
  tree.write("src/a.src", "import v.src\nbody a");
  tree.write("src/v.src", "body v");
  tree.write("inc/v.src", "body inc");
  tree.write("out/a.src", "");
  tree.write("out/v.src", "");
  tree.touch("src/a.src", 100);
  tree.touch("inc/v.src", 100);
  tree.touch("src/v.src", 200);
  tree.touch("out/a.src", 150);
  tree.touch("out/v.src", 150);
  tree
}

#[test]
fn candidate_is_not_shadowed_by_include_dir_namesake() {
  let tree = shadowed_candidate();
  let options = PipelineOptions::new(tree.path("src")).include_dirs(vec![tree.path("inc")]);
  let transform = ImportTransform::new(&tree);

  check_dependencies(&FileAccess::unprivileged(), &options, &transform).unwrap();

  assert_eq!(transform.take_updates(), ["a.src", "v.src"]);
  assert_eq!(tree.read("out/v.src"), "BODY V");
}

#[test]
fn outcome_does_not_depend_on_candidate_order() {
  for order in [["a.src", "v.src"], ["v.src", "a.src"]] {
    let tree = shadowed_candidate();
    let options = PipelineOptions::new(tree.path("src"))
      .include_dirs(vec![tree.path("inc")])
      .files(order.iter().map(PathBuf::from).collect());
    let transform = ImportTransform::new(&tree);

    let outcome = check_dependencies(&FileAccess::unprivileged(), &options, &transform).unwrap();

    assert_eq!(outcome.updated.len(), 2, "order {order:?}");
    assert_eq!(transform.take_updates(), ["a.src", "v.src"], "order {order:?}");
  }
}
