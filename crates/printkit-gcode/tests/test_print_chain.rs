//! End-to-end checks of the assembled print chain: source through
//! normalization, command injection, and progress reporting.

use parking_lot::RwLock;
use printkit_core::{
    CommunicationState, PositioningMode, PrintJob, PrinterMove, ProgressReportingMode,
};
use printkit_gcode::{
    build_print_chain, CommandInjector, GcodeStream, SharedDestination, SharedJob,
    SharedPositioningMode, SharedState, StreamProgress, StringGcodeStream,
};
use std::sync::Arc;

struct ChainFixture {
    chain: Box<dyn GcodeStream>,
    injector: CommandInjector,
    progress: Arc<StreamProgress>,
    destination: SharedDestination,
    job: SharedJob,
}

fn chain_over(content: &str, reporting_mode: ProgressReportingMode) -> ChainFixture {
    let source = StringGcodeStream::new(content);
    let progress = source.progress();
    let injector = CommandInjector::new();
    let destination: SharedDestination = Arc::new(RwLock::new(PrinterMove::default()));
    let positioning_mode: SharedPositioningMode =
        Arc::new(RwLock::new(PositioningMode::Absolute));
    let state: SharedState = Arc::new(RwLock::new(CommunicationState::Printing));
    let job: SharedJob = Arc::new(RwLock::new(Some(PrintJob::new(
        "test.gcode",
        progress.total_lines(),
    ))));

    let chain = build_print_chain(
        Box::new(source),
        injector.clone(),
        destination.clone(),
        positioning_mode,
        reporting_mode,
        state,
        job.clone(),
    );

    ChainFixture {
        chain,
        injector,
        progress,
        destination,
        job,
    }
}

#[test]
fn chain_delivers_cleaned_lines_and_injected_commands() {
    let mut f = chain_over(
        "; sliced by printkit\nG28\n\nG1 X10 ; move right\nG1 X20 Y5\n",
        ProgressReportingMode::None,
    );

    assert_eq!(f.chain.read_line().as_deref(), Some("G28"));

    f.injector.add("M104 S210");
    assert_eq!(f.chain.read_line().as_deref(), Some("M104 S210"));

    assert_eq!(f.chain.read_line().as_deref(), Some("G1 X10"));
    assert_eq!(f.chain.read_line().as_deref(), Some("G1 X20 Y5"));
    assert_eq!(f.chain.read_line(), None);

    // Destination tracked across file and injected traffic
    let dest = *f.destination.read();
    assert_eq!(dest.position.x, 20.0);
    assert_eq!(dest.position.y, 5.0);

    // Every source line counts as consumed, including skipped noise
    assert_eq!(f.progress.lines_consumed(), 5);
    assert_eq!(f.progress.percent_complete(), 100.0);
}

#[test]
fn progress_reports_interleave_without_displacing_lines() {
    let mut f = chain_over("G1 X1\nG1 X2\nG1 X3\nG1 X4", ProgressReportingMode::M73);

    // Drive the chain the way a connection does: pull a line, then fold
    // source progress into the job.
    let mut sent = Vec::new();
    while let Some(line) = f.chain.read_line() {
        sent.push(line);
        let percent = f.progress.percent_complete();
        if let Some(job) = f.job.write().as_mut() {
            job.update_percent_done(percent);
        }
    }

    assert_eq!(
        sent,
        [
            "G1 X1", "M73 P25", "G1 X2", "M73 P50", "G1 X3", "M73 P75", "G1 X4", "M73 P100",
        ]
    );
}

#[test]
fn m117_reports_carry_a_readable_message() {
    let mut f = chain_over("G1 X1\nG1 X2", ProgressReportingMode::M117);

    let mut sent = Vec::new();
    while let Some(line) = f.chain.read_line() {
        sent.push(line);
        let percent = f.progress.percent_complete();
        if let Some(job) = f.job.write().as_mut() {
            job.update_percent_done(percent);
        }
    }

    assert_eq!(
        sent,
        [
            "G1 X1",
            "M117 50% complete",
            "G1 X2",
            "M117 100% complete",
        ]
    );
}

#[test]
fn injected_commands_fold_into_the_tracked_destination() {
    let mut f = chain_over("G1 X10 Y10 Z1\nG1 X30", ProgressReportingMode::None);

    assert_eq!(f.chain.read_line().as_deref(), Some("G1 X10 Y10 Z1"));

    // A manual jog slipped into the print
    f.injector.add("G1 Z5 F600");
    assert_eq!(f.chain.read_line().as_deref(), Some("G1 Z5 F600"));
    assert_eq!(f.destination.read().position.z, 5.0);
    assert_eq!(f.destination.read().feed_rate, 600.0);

    // The next file line inherits the jogged height
    assert_eq!(f.chain.read_line().as_deref(), Some("G1 X30"));
    let dest = *f.destination.read();
    assert_eq!(dest.position.x, 30.0);
    assert_eq!(dest.position.y, 10.0);
    assert_eq!(dest.position.z, 5.0);
}

#[test]
fn empty_file_ends_immediately_with_no_reports() {
    let mut f = chain_over("; nothing but comments\n\n", ProgressReportingMode::M73);

    assert_eq!(f.chain.read_line(), None);
    assert_eq!(f.chain.read_line(), None);
}
