//! Tick throughput benchmark — measure one scheduler tick for N running
//! commands over N disjoint subsystems.
//!
//! The per-tick path (execute → is_finished per command, then default
//! installation) is the hot loop of the engine; it must stay comfortably
//! inside a 20 ms tick budget even for machine configurations far larger
//! than any real one.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use ratchet_core::{Action, Command, Scheduler};

/// Leaf that spins forever with a token amount of work per tick.
struct Spin {
    value: u64,
}

impl Action for Spin {
    fn execute(&mut self) {
        self.value = self.value.wrapping_mul(6364136223846793005).wrapping_add(1);
    }
    fn is_finished(&mut self) -> bool {
        // Never finishes; the bench measures steady-state ticking.
        self.value == u64::MAX
    }
}

/// A scheduler with `n` running commands on `n` disjoint subsystems,
/// each subsystem also carrying a default command.
fn loaded_scheduler(n: usize) -> Scheduler {
    let mut sched = Scheduler::new();
    for i in 0..n {
        let sub = sched.register_subsystem(&format!("sub{i}"));
        sched
            .set_default_command(sub, Command::action(Spin { value: 1 }, [sub]))
            .expect("default requires its subsystem");
        sched.schedule(Command::action(Spin { value: i as u64 }, [sub]));
    }
    sched
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for n in [1usize, 8, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut sched = loaded_scheduler(n);
            b.iter(|| sched.run());
        });
    }
    group.finish();
}

fn bench_schedule_preempt(c: &mut Criterion) {
    c.bench_function("schedule_preempt", |b| {
        let mut sched = Scheduler::new();
        let sub = sched.register_subsystem("launcher");
        sched.schedule(Command::action(Spin { value: 0 }, [sub]));
        // Each iteration preempts the previous owner.
        b.iter(|| sched.schedule(Command::action(Spin { value: 0 }, [sub])));
    });
}

criterion_group!(benches, bench_tick, bench_schedule_preempt);
criterion_main!(benches);
