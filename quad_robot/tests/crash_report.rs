//! Hard crashes of the robot program reach the simulator's mapping.
//!
//! The robot runs in a forked child that arms a crash reporter on the
//! shared error buffer and then dies from a fatal signal.

use quad::shm::message::SimulatorMessage;
use quad_robot::fault::CrashReporter;
use quad_shared_memory::SharedRegion;

fn crash_child(region: &SharedRegion<SimulatorMessage>, signal: libc::c_int) -> ! {
    // Safety: the mapping outlives the child, which never returns.
    let buffer = unsafe { &raw mut (*region.as_ptr()).robot_to_sim.error_message };
    match unsafe { CrashReporter::arm(buffer) } {
        Ok(_reporter) => {
            unsafe { libc::raise(signal) };
            unsafe { libc::_exit(2) }
        }
        Err(_) => unsafe { libc::_exit(3) },
    }
}

fn wait_signal(pid: libc::pid_t) -> libc::c_int {
    let mut status = 0;
    // Safety: pid is our own child.
    let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(waited, pid);
    assert!(
        libc::WIFSIGNALED(status),
        "child exited with status {} instead of dying from a signal",
        libc::WEXITSTATUS(status)
    );
    libc::WTERMSIG(status)
}

#[test]
fn fatal_signal_publishes_crash_text() {
    let cases = [
        (libc::SIGSEGV, "segv", "robot program crashed: segmentation fault (SIGSEGV)"),
        (libc::SIGBUS, "bus", "robot program crashed: bus error (SIGBUS)"),
    ];
    for (signal, tag, expected) in cases {
        let name = format!("/quad-crash-{tag}-{}", std::process::id());
        let region = SharedRegion::<SimulatorMessage>::create(&name).unwrap();

        // Safety: the child only arms the reporter and raises.
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            crash_child(&region, signal);
        }
        assert!(pid > 0, "fork failed");

        assert_eq!(wait_signal(pid), signal);
        let text = region.get().robot_to_sim.error_message().unwrap_or_default();
        assert_eq!(text, expected);
        region.destroy().unwrap();
    }
}
