//! Integration tests for the pcpp capture-and-forward task
//!
//! Uses a small in-test engine that substitutes object-like macros given
//! with `-D` and resolves `#include "x"` against `-I` directories, so no
//! external preprocessor is needed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use ppstage_core::config::TaskConfig;
use ppstage_core::TaskOptions;
use ppstage_engine::{ArgumentVector, CommandEngine, Engine, EngineError, OptionKind, OutputSink};
use ppstage_task::{
    BatchRunner, CleanupStatus, Disposition, ForwardChannel, PcppTask, Task, TaskContext,
    TaskError, TaskOutcome,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Engine doing literal macro substitution and quoted includes
#[derive(Default)]
struct SubstitutingEngine {
    /// Output paths seen, one per run
    sinks: Mutex<Vec<String>>,
}

fn expand(line: &str, macros: &[(String, String)]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut ident = String::new();

    let flush = |ident: &mut String, out: &mut String| {
        match macros.iter().find(|(name, _)| *name == *ident) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(ident),
        }
        ident.clear();
    };

    for c in line.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
        } else {
            flush(&mut ident, &mut out);
            out.push(c);
        }
    }
    flush(&mut ident, &mut out);
    out
}

impl Engine for SubstitutingEngine {
    fn run(&self, argv: &ArgumentVector, sink: &mut dyn OutputSink) -> Result<i32, EngineError> {
        self.sinks
            .lock()
            .unwrap()
            .push(argv.output().unwrap_or_default().to_string());

        let input = argv
            .input()
            .ok_or_else(|| EngineError::InvalidArguments("no input".into()))?;
        let Ok(source) = fs::read_to_string(input) else {
            // fails before writing anything
            return Ok(2);
        };

        let macros: Vec<(String, String)> = argv
            .values(OptionKind::Defines)
            .into_iter()
            .map(|d| match d.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (d.to_string(), "1".to_string()),
            })
            .collect();
        let includes = argv.values(OptionKind::Includes);

        for line in source.split_inclusive('\n') {
            if let Some(rest) = line.trim().strip_prefix("#include") {
                let name = rest.trim().trim_matches('"');
                let found = includes
                    .iter()
                    .map(|dir| Path::new(dir).join(name))
                    .find(|p| p.exists());
                match found {
                    Some(path) => {
                        let text = fs::read_to_string(path)?;
                        sink.write_text(&text).map_err(EngineError::Sink)?;
                    }
                    None => return Ok(1),
                }
                continue;
            }
            sink.write_text(&expand(line, &macros))
                .map_err(EngineError::Sink)?;
        }

        Ok(0)
    }

    fn name(&self) -> &str {
        "substituting"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Engine writing straight to the output path instead of through the sink
struct DirectWriteEngine;

impl Engine for DirectWriteEngine {
    fn run(&self, argv: &ArgumentVector, _sink: &mut dyn OutputSink) -> Result<i32, EngineError> {
        let path = argv
            .output()
            .ok_or_else(|| EngineError::InvalidArguments("no output".into()))?;
        fs::write(path, "x = 1\n")?;
        Ok(0)
    }

    fn name(&self) -> &str {
        "direct"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Stdout that deletes the sink directory of the engine's latest run
struct SinkRemovingStdout {
    engine: Arc<SubstitutingEngine>,
    text: Vec<u8>,
}

impl Write for SinkRemovingStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(sink) = self.engine.sinks.lock().unwrap().last() {
            if let Some(dir) = Path::new(sink).parent().filter(|d| d.exists()) {
                fs::remove_dir_all(dir)?;
            }
        }
        self.text.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    work: TempDir,
    sinks: TempDir,
    engine: Arc<SubstitutingEngine>,
    task: PcppTask,
}

impl Fixture {
    fn new() -> Self {
        let work = TempDir::new().unwrap();
        let sinks = TempDir::new().unwrap();
        let engine = Arc::new(SubstitutingEngine::default());
        let settings = TaskConfig {
            temp_root: Some(sinks.path().to_path_buf()),
            ..TaskConfig::default()
        };
        let task = PcppTask::new(engine.clone()).with_settings(settings);
        Self {
            work,
            sinks,
            engine,
            task,
        }
    }

    fn document(&self, name: &str, content: &str) -> String {
        let path = self.work.path().join(name);
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.work.path().join(name)
    }

    fn perform(
        &self,
        options: &TaskOptions,
    ) -> (Result<TaskOutcome, TaskError>, ForwardChannel, String) {
        self.perform_with(&self.task, options)
    }

    fn perform_with(
        &self,
        task: &PcppTask,
        options: &TaskOptions,
    ) -> (Result<TaskOutcome, TaskError>, ForwardChannel, String) {
        let mut forward = ForwardChannel::for_task(task);
        let mut stdout = Vec::new();
        let result = {
            let mut ctx = TaskContext::new(&mut forward, &mut stdout);
            task.perform(options, &mut ctx)
        };
        (result, forward, String::from_utf8(stdout).unwrap())
    }

    /// Task around another engine, sharing this fixture's sink root
    fn task_with(&self, engine: Arc<dyn Engine>, sink_file_name: &str) -> PcppTask {
        PcppTask::new(engine).with_settings(TaskConfig {
            temp_root: Some(self.sinks.path().to_path_buf()),
            sink_file_name: sink_file_name.to_string(),
            ..TaskConfig::default()
        })
    }

    /// Number of sink directories still on disk
    fn leftover_sinks(&self) -> usize {
        fs::read_dir(self.sinks.path()).unwrap().count()
    }

    fn work_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.work.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[test]
fn test_define_printed_to_stdout() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x = XVAL\n");
    let options = TaskOptions::new(input).define("XVAL=1");

    let (result, forward, stdout) = fx.perform(&options);
    let outcome = result.unwrap();

    assert_eq!(outcome.return_code(), 0);
    assert!(outcome.output().text().contains("x = 1"));
    assert_eq!(stdout, "x = 1\n");
    assert_eq!(outcome.disposition, Disposition::Printed);
    assert_eq!(forward.get_str("data"), Some("x = 1\n"));
    assert_eq!(outcome.cleanup, CleanupStatus::Removed);
    assert_eq!(fx.work_files(), vec!["my.f90"]);
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_output_file_written_and_forwarded() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x = XVAL\n");
    let out = fx.path("out.txt");
    let options = TaskOptions::new(input).define("XVAL=1").with_output(&out);

    let (result, forward, stdout) = fx.perform(&options);
    let outcome = result.unwrap();

    let written = fs::read_to_string(&out).unwrap();
    assert!(written.contains("x = 1"));
    assert_eq!(forward.get_str("data"), Some(written.as_str()));
    assert_eq!(outcome.disposition, Disposition::Written(out.clone()));
    assert!(stdout.is_empty());
    assert_eq!(fx.work_files(), vec!["my.f90", "out.txt"]);
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_engine_writes_to_adapter_owned_file() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x\n");
    let out = fx.path("out.txt");

    let (result, _, _) = fx.perform(&TaskOptions::new(input).with_output(&out));
    result.unwrap();

    let sinks = fx.engine.sinks.lock().unwrap();
    assert_eq!(sinks.len(), 1);
    let physical = PathBuf::from(&sinks[0]);
    assert!(physical.starts_with(fx.sinks.path()));
    assert_ne!(physical, out);
}

#[test]
fn test_unresolved_include_keeps_partial_output() {
    let fx = Fixture::new();
    let input = fx.document("main.c", "a = 1;\n#include \"missing.h\"\nb = 2;\n");

    let (result, forward, stdout) = fx.perform(&TaskOptions::new(input));
    let outcome = result.unwrap();

    assert_ne!(outcome.return_code(), 0);
    assert_eq!(outcome.output().text(), "a = 1;\n");
    assert_eq!(stdout, "a = 1;\n");
    assert_eq!(forward.get_str("data"), Some("a = 1;\n"));
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_include_resolved_from_include_path() {
    let fx = Fixture::new();
    let inc = fx.path("inc");
    fs::create_dir(&inc).unwrap();
    fs::write(inc.join("defs.h"), "int y = YVAL;\n").unwrap();
    let input = fx.document("main.c", "#include \"defs.h\"\nint x;\n");

    let options = TaskOptions::new(input)
        .include(fx.path("empty").to_string_lossy())
        .include(inc.to_string_lossy());
    let (result, _, stdout) = fx.perform(&options);

    assert_eq!(result.unwrap().return_code(), 0);
    assert_eq!(stdout, "int y = YVAL;\nint x;\n");
}

#[test]
fn test_literal_text_round_trips() {
    let fx = Fixture::new();
    let text = "program test\n   print *, \"hello\"\nend program\n";
    let input = fx.document("plain.f90", text);

    let (result, forward, _) = fx.perform(&TaskOptions::new(input));
    let outcome = result.unwrap();

    assert_eq!(outcome.output().text(), text);
    assert_eq!(forward.get_str("data"), Some(text));
}

#[test]
fn test_empty_document_is_not_a_capture_failure() {
    let fx = Fixture::new();
    let input = fx.document("empty.c", "");

    let (result, forward, stdout) = fx.perform(&TaskOptions::new(input));
    let outcome = result.unwrap();

    assert_eq!(outcome.return_code(), 0);
    assert!(outcome.output().is_empty());
    assert!(stdout.is_empty());
    assert_eq!(forward.get_str("data"), Some(""));
}

#[test]
fn test_no_output_is_capture_failure() {
    let fx = Fixture::new();
    let missing = fx.path("missing.c").to_string_lossy().into_owned();

    let (result, forward, stdout) = fx.perform(&TaskOptions::new(missing));

    match result {
        Err(TaskError::Capture { return_code, .. }) => assert_eq!(return_code, 2),
        other => panic!("expected capture failure, got {:?}", other.map(|o| o.return_code())),
    }
    assert!(forward.is_empty());
    assert!(stdout.is_empty());
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_unwritable_output_is_relocation_failure() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x = XVAL\n");
    let out = fx.path("no/such/dir/out.txt");
    let options = TaskOptions::new(input).define("XVAL=1").with_output(&out);

    let (result, forward, _) = fx.perform(&options);

    match result {
        Err(TaskError::Relocation {
            return_code, path, ..
        }) => {
            assert_eq!(return_code, 0);
            assert_eq!(path, out);
        }
        other => panic!("expected relocation failure, got {:?}", other.map(|o| o.return_code())),
    }
    // captured text still reaches downstream tasks
    assert_eq!(forward.get_str("data"), Some("x = 1\n"));
    assert!(!out.exists());
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_engine_that_cannot_start_releases_sink() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x\n");
    let engine = Arc::new(CommandEngine::with_path(PathBuf::from(
        "/nonexistent/ppstage-cpp",
    )));
    let task = PcppTask::new(engine).with_settings(TaskConfig {
        temp_root: Some(fx.sinks.path().to_path_buf()),
        ..TaskConfig::default()
    });

    let mut forward = ForwardChannel::for_task(&task);
    let mut stdout = Vec::new();
    let result = task.perform(
        &TaskOptions::new(input),
        &mut TaskContext::new(&mut forward, &mut stdout),
    );

    assert!(matches!(result, Err(TaskError::Engine(EngineError::Spawn { .. }))));
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_custom_forward_field() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x\n");
    let task = PcppTask::new(fx.engine.clone()).with_settings(TaskConfig {
        forward_field: "source".into(),
        ..TaskConfig::default()
    });

    let decls = task.forwards();
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].name, "source");
    assert_eq!(decls[0].help, "preprocessed source code");

    let mut forward = ForwardChannel::for_task(&task);
    let mut stdout = Vec::new();
    task.perform(
        &TaskOptions::new(input),
        &mut TaskContext::new(&mut forward, &mut stdout),
    )
    .unwrap();

    assert_eq!(forward.get_str("source"), Some("x\n"));
    assert!(forward.get("data").is_none());
}

/// Engine that holds every run open until all concurrent runs have started
struct RendezvousEngine {
    barrier: Barrier,
    sinks: Mutex<Vec<PathBuf>>,
}

impl Engine for RendezvousEngine {
    fn run(&self, argv: &ArgumentVector, sink: &mut dyn OutputSink) -> Result<i32, EngineError> {
        let input = argv.input().unwrap_or_default().to_string();
        sink.write_text(&format!("from {}\n", input))
            .map_err(EngineError::Sink)?;
        self.sinks
            .lock()
            .unwrap()
            .push(PathBuf::from(argv.output().unwrap_or_default()));
        self.barrier.wait();
        Ok(0)
    }

    fn name(&self) -> &str {
        "rendezvous"
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[test]
fn test_concurrent_invocations_use_distinct_sinks() {
    let sinks_root = TempDir::new().unwrap();
    let engine = Arc::new(RendezvousEngine {
        barrier: Barrier::new(2),
        sinks: Mutex::new(Vec::new()),
    });
    let task = Arc::new(PcppTask::new(engine.clone()).with_settings(TaskConfig {
        temp_root: Some(sinks_root.path().to_path_buf()),
        ..TaskConfig::default()
    }));

    let handles: Vec<_> = ["first.c", "second.c"]
        .into_iter()
        .map(|name| {
            let task = Arc::clone(&task);
            thread::spawn(move || {
                let mut forward = ForwardChannel::for_task(&*task);
                let mut stdout = Vec::new();
                let outcome = task
                    .perform(
                        &TaskOptions::new(name),
                        &mut TaskContext::new(&mut forward, &mut stdout),
                    )
                    .unwrap();
                (name, outcome)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_ne!(outcomes[0].1.sink_id, outcomes[1].1.sink_id);
    for (name, outcome) in &outcomes {
        assert_eq!(outcome.output().text(), format!("from {}\n", name));
    }

    let sinks = engine.sinks.lock().unwrap();
    assert_eq!(sinks.len(), 2);
    assert_ne!(sinks[0], sinks[1]);
    assert!(sinks.iter().all(|p| !p.exists()));
    assert_eq!(fs::read_dir(sinks_root.path()).unwrap().count(), 0);
}

#[test]
fn test_batch_runs_each_document_in_isolation() {
    let fx = Fixture::new();
    let docs: Vec<TaskOptions> = (0..6)
        .map(|i| {
            let input = fx.document(&format!("doc{}.c", i), &format!("v = N{}\n", i));
            TaskOptions::new(input).define(format!("N{}={}", i, i * 10))
        })
        .collect();

    let items = BatchRunner::new(&fx.task).with_jobs(3).run(&docs).unwrap();

    assert_eq!(items.len(), 6);
    for (i, item) in items.iter().enumerate() {
        let expected = format!("v = {}\n", i * 10);
        assert_eq!(item.return_code(), 0);
        assert_eq!(String::from_utf8(item.stdout.clone()).unwrap(), expected);
        assert_eq!(item.forwarded.get_str("data"), Some(expected.as_str()));
        assert_eq!(item.options, docs[i]);
    }
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_batch_reports_failures_per_document() {
    let fx = Fixture::new();
    let good = TaskOptions::new(fx.document("good.c", "ok\n"));
    let bad = TaskOptions::new(fx.path("missing.c").to_string_lossy().into_owned());

    let items = BatchRunner::new(&fx.task).run(&[good, bad]).unwrap();

    assert_eq!(items[0].return_code(), 0);
    assert!(matches!(items[1].result, Err(TaskError::Capture { .. })));
    assert_eq!(items[1].return_code(), 2);
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_batch_rejects_shared_output_file() {
    let fx = Fixture::new();
    let docs = vec![
        TaskOptions::new(fx.document("a.c", "a\n")).with_output(fx.path("out.txt")),
        TaskOptions::new(fx.document("b.c", "b\n")),
    ];

    let result = BatchRunner::new(&fx.task).run(&docs);

    assert!(matches!(result, Err(TaskError::InvalidBatch(_))));
    assert!(fx.engine.sinks.lock().unwrap().is_empty());
}

#[test]
fn test_task_metadata() {
    let fx = Fixture::new();
    let info = fx.task.info();

    assert_eq!(info.name, "pcpp");
    assert_eq!(info.version, "0.1.0");
    let flags: Vec<&str> = fx.task.options().iter().map(|d| d.flag).collect();
    assert_eq!(flags, vec!["-o", "-D", "-I"]);
}

#[test]
fn test_relocation_failure_never_exits_zero() {
    let fx = Fixture::new();
    let options = TaskOptions::new(fx.document("a.c", "a\n"))
        .with_output(fx.path("no/such/dir/out.txt"));

    let item = BatchRunner::new(&fx.task).run_one(&options);

    assert_eq!(item.return_code(), 0);
    assert_eq!(item.exit_code(), 1);
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_engine_writing_to_output_path_is_captured() {
    let fx = Fixture::new();
    let task = fx.task_with(Arc::new(DirectWriteEngine), "output.i");
    let input = fx.document("my.f90", "x = XVAL\n");

    let (result, forward, stdout) = fx.perform_with(&task, &TaskOptions::new(input));
    let outcome = result.unwrap();

    assert_eq!(outcome.return_code(), 0);
    assert_eq!(outcome.output().text(), "x = 1\n");
    assert_eq!(stdout, "x = 1\n");
    assert_eq!(forward.get_str("data"), Some("x = 1\n"));
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_sink_file_name_cannot_leave_sink() {
    let fx = Fixture::new();
    let engine = Arc::new(SubstitutingEngine::default());
    let task = fx.task_with(engine.clone(), "../escaped.i");
    let input = fx.document("my.f90", "hi\n");

    let (result, forward, _) = fx.perform_with(&task, &TaskOptions::new(input));

    match result {
        Err(TaskError::Sink(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
        other => panic!("expected sink failure, got {:?}", other.map(|o| o.return_code())),
    }
    assert!(engine.sinks.lock().unwrap().is_empty());
    assert!(forward.is_empty());
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_cleanup_failure_keeps_outcome() {
    let fx = Fixture::new();
    let input = fx.document("main.c", "a = 1;\n#include \"missing.h\"\n");
    let mut forward = ForwardChannel::for_task(&fx.task);
    let mut stdout = SinkRemovingStdout {
        engine: fx.engine.clone(),
        text: Vec::new(),
    };

    let result = {
        let mut ctx = TaskContext::new(&mut forward, &mut stdout);
        fx.task.perform(&TaskOptions::new(input), &mut ctx)
    };
    let outcome = result.unwrap();

    assert_eq!(outcome.return_code(), 1);
    assert!(matches!(outcome.cleanup, CleanupStatus::Failed { .. }));
    assert_eq!(outcome.disposition, Disposition::Printed);
    assert_eq!(stdout.text, b"a = 1;\n");
    assert_eq!(forward.get_str("data"), Some("a = 1;\n"));
}

#[test]
fn test_relocation_failure_outranks_forward_failure() {
    let fx = Fixture::new();
    let input = fx.document("my.f90", "x\n");
    let out = fx.path("no/such/dir/out.txt");
    // channel without the task's declared field
    let mut forward = ForwardChannel::new(Vec::new());
    let mut stdout = Vec::new();

    let result = {
        let mut ctx = TaskContext::new(&mut forward, &mut stdout);
        fx.task.perform(&TaskOptions::new(input).with_output(&out), &mut ctx)
    };

    assert!(matches!(result, Err(TaskError::Relocation { return_code: 0, .. })));
    assert_eq!(fx.leftover_sinks(), 0);
}

#[test]
fn test_batch_rejects_repeated_stdin() {
    let fx = Fixture::new();
    let docs = vec![
        TaskOptions::new("-"),
        TaskOptions::new(fx.document("a.c", "a\n")),
        TaskOptions::new("-"),
    ];

    let result = BatchRunner::new(&fx.task).run(&docs);

    assert!(matches!(result, Err(TaskError::InvalidBatch(_))));
    assert!(fx.engine.sinks.lock().unwrap().is_empty());
}
