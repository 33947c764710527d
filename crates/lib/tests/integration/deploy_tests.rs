use std::path::Path;

use wdeploy_lib::access::FileAccess;
use wdeploy_lib::config::Config;
use wdeploy_lib::lock::{DeployLock, DeployLockError};
use wdeploy_lib::tasks::{DeployContext, TaskError, TaskRegistry};

use super::common::TestTree;

const PROJECT: &str = r#"
prefix = "public"
permissions = "755"

[[tasks]]
task = "mkdir"
path = "logs"

[[tasks]]
task = "synctree"
source = "app"
destination = "app"

[[tasks]]
task = "makepages"
source = "pages"
destination = "www"
headers = ["header"]
pages = [{ title = "Welcome", body = "index" }]

[[tasks]]
task = "cgi"
path = "cgi-bin/app.wsgi"

[[tasks]]
task = "symlink"
source = "www"
destination = "current"
"#;

fn project() -> TestTree {
  let tree = TestTree::new();
  tree.write("wdeploy.toml", PROJECT);
  tree.write("app/main.py", "run()");
  tree.write("app/main.pyc", "bytecode");
  tree.write("pages/header.html", "<h1>%TITLE%</h1>");
  tree.write("pages/index.html", "<p>hello</p>");
  tree
}

fn context(config_path: &Path) -> DeployContext {
  let config = Config::load(config_path).unwrap();
  DeployContext::with_access(config, FileAccess::unprivileged())
}

#[test]
fn runs_a_whole_project() {
  let tree = project();
  let ctx = context(&tree.path("wdeploy.toml"));

  TaskRegistry::builtin().run_all(&ctx, &ctx.config.tasks).unwrap();

  let public = &ctx.config.prefix;
  assert!(public.join("logs").is_dir());
  assert!(public.join("app/main.py").is_file());
  assert!(!public.join("app/main.pyc").exists());
  assert_eq!(
    std::fs::read_to_string(public.join("www/index.html")).unwrap(),
    "<h1>Welcome</h1><p>hello</p>"
  );
  assert!(public.join("cgi-bin/app.wsgi").is_file());
  assert_eq!(std::fs::read_link(public.join("current")).unwrap(), public.join("www"));

  // A second run is idempotent.
  TaskRegistry::builtin().run_all(&ctx, &ctx.config.tasks).unwrap();
}

#[test]
fn written_files_get_the_configured_mode() {
  use std::os::unix::fs::PermissionsExt;

  let tree = project();
  let ctx = context(&tree.path("wdeploy.toml"));
  TaskRegistry::builtin().run_all(&ctx, &ctx.config.tasks).unwrap();

  let mode = std::fs::metadata(ctx.config.prefix.join("cgi-bin/app.wsgi"))
    .unwrap()
    .permissions()
    .mode();
  assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn unknown_task_in_config_is_rejected() {
  let tree = TestTree::new();
  tree.write("wdeploy.toml", "prefix = \"out\"\n[[tasks]]\ntask = \"compile\"\n");
  let ctx = context(&tree.path("wdeploy.toml"));

  let err = TaskRegistry::builtin().run_all(&ctx, &ctx.config.tasks).unwrap_err();
  assert!(matches!(err, TaskError::UnknownTask(name) if name == "compile"));
}

#[test]
fn concurrent_runs_are_refused() {
  let tree = project();
  let _held = DeployLock::acquire(tree.root(), "run").unwrap();

  let err = DeployLock::acquire(tree.root(), "run").unwrap_err();
  assert!(matches!(err, DeployLockError::Contention { .. }));
  assert!(err.to_string().contains("remove the lock file"));
}
