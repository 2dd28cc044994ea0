//! Optional profiling around the server run.
//!
//! `cpu` samples the process with pprof and writes a flamegraph SVG when the run ends.
//! `object` and `heap` use the dhat heap profiler and need the `dhat-heap` feature,
//! which also installs dhat's global allocator in the `spindle` binary. `heap` keeps full
//! backtraces; `object` trims them and logs allocation counts when the run ends.
//! The sampler only counts CPU time, so `wall` is skipped. A skipped mode or a failing
//! profiler never stops the server from starting.

use crate::config::ProfileMode;
use std::env;
use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const CPU_SAMPLE_HZ: i32 = 997;

#[cfg(feature = "dhat-heap")]
const OBJECT_BACKTRACE_FRAMES: usize = 10;

/// Where the profile for `mode` goes: `configured` if set, otherwise
/// `<temp dir>/<program>-<unix seconds>.<extension>`. `None` when profiling is off.
pub fn output_path(mode: ProfileMode, configured: Option<&Path>) -> Option<PathBuf> {
    let extension = mode.extension()?;
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    let program = env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "spindle".to_owned());
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs());

    Some(env::temp_dir().join(format!("{program}-{secs}.{extension}")))
}

/// Runs `future` under the profiler for `mode` and reports where the profile went,
/// whatever the future returned.
pub async fn with_profiling<F: Future>(mode: ProfileMode, configured: Option<&Path>, future: F) -> F::Output {
    let Some(path) = output_path(mode, configured) else {
        return future.await;
    };

    let Some(session) = Session::start(mode, &path) else {
        return future.await;
    };

    let output = future.await;
    session.finish();
    output
}

enum Session {
    Cpu { guard: pprof::ProfilerGuard<'static>, path: PathBuf },
    #[cfg(feature = "dhat-heap")]
    Heap { profiler: dhat::Profiler, mode: ProfileMode, path: PathBuf },
}

impl Session {
    fn start(mode: ProfileMode, path: &Path) -> Option<Self> {
        match mode {
            ProfileMode::Cpu => {
                let guard = pprof::ProfilerGuardBuilder::default()
                    .frequency(CPU_SAMPLE_HZ)
                    .blocklist(&["libc", "libgcc", "pthread", "vdso"])
                    .build();
                match guard {
                    Ok(guard) => {
                        info!(?mode, path = %path.display(), "start profiling");
                        Some(Self::Cpu { guard, path: path.to_path_buf() })
                    }
                    Err(e) => {
                        warn!(cause = %e, ?mode, "can't start cpu profiler, skip");
                        None
                    }
                }
            }
            #[cfg(feature = "dhat-heap")]
            ProfileMode::Object | ProfileMode::Heap => {
                let frames = (mode == ProfileMode::Object).then_some(OBJECT_BACKTRACE_FRAMES);
                let profiler = dhat::Profiler::builder().file_name(path).trim_backtraces(frames).build();
                info!(?mode, path = %path.display(), "start profiling");
                Some(Self::Heap { profiler, mode, path: path.to_path_buf() })
            }
            _ => {
                debug!(?mode, path = %path.display(), "profiling unavailable, skip");
                None
            }
        }
    }

    fn finish(self) {
        match self {
            Self::Cpu { guard, path } => match write_flamegraph(&guard, &path) {
                Ok(()) => info!(mode = ?ProfileMode::Cpu, path = %path.display(), "profile written"),
                Err(e) => warn!(cause = %e, path = %path.display(), "can't write cpu profile"),
            },
            #[cfg(feature = "dhat-heap")]
            Self::Heap { profiler, mode, path } => {
                if mode == ProfileMode::Object {
                    let stats = dhat::HeapStats::get();
                    info!(
                        total_blocks = stats.total_blocks,
                        total_bytes = stats.total_bytes,
                        live_blocks = stats.curr_blocks,
                        live_bytes = stats.curr_bytes,
                        "allocation summary"
                    );
                }
                drop(profiler);
                info!(?mode, path = %path.display(), "profile written");
            }
        }
    }
}

fn write_flamegraph(guard: &pprof::ProfilerGuard<'_>, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let report = guard.report().build()?;
    let file = File::create(path)?;
    report.flamegraph(file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn no_path_without_mode() {
        assert_eq!(output_path(ProfileMode::None, Some(Path::new("/tmp/ignored"))), None);
    }

    #[test]
    fn configured_path_wins() {
        let path = output_path(ProfileMode::Heap, Some(Path::new("/tmp/run.json"))).unwrap();
        assert_eq!(path, Path::new("/tmp/run.json"));
    }

    #[test]
    fn generated_path_per_mode() {
        for (mode, extension) in
            [(ProfileMode::Cpu, ".cpu.svg"), (ProfileMode::Wall, ".wall.svg"), (ProfileMode::Object, ".objects.json"), (ProfileMode::Heap, ".heap.json")]
        {
            let path = output_path(mode, None).unwrap();
            assert_eq!(path.parent().unwrap(), env::temp_dir());

            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.ends_with(extension), "{name}");
            let stem = name.trim_end_matches(extension);
            let (_program, secs) = stem.rsplit_once('-').unwrap();
            assert!(secs.parse::<u64>().unwrap() > 0);
        }
    }

    #[tokio::test]
    async fn unavailable_modes_still_run() {
        for mode in [ProfileMode::None, ProfileMode::Wall] {
            let output = with_profiling(mode, None, async { 42 }).await;
            assert_eq!(output, 42);
        }
    }

    #[tokio::test]
    async fn cpu_profile_is_written_as_flamegraph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.cpu.svg");

        let output = with_profiling(ProfileMode::Cpu, Some(&path), async {
            let start = Instant::now();
            let mut acc = 0u64;
            while start.elapsed() < Duration::from_millis(300) {
                acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(7));
            }
            Err::<u64, _>(acc)
        })
        .await;

        assert!(output.is_err());
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"), "{svg}");
    }

    #[cfg(not(feature = "dhat-heap"))]
    #[tokio::test]
    async fn heap_modes_are_noops_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heap.json");

        for mode in [ProfileMode::Object, ProfileMode::Heap] {
            let output = with_profiling(mode, Some(&path), async { Err::<(), _>("failed run") }).await;
            assert!(output.is_err());
            assert!(!path.exists());
        }
    }
}
