// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::effect::{PoolEvent, TimerId};
use crate::test_support::{config, leased, Harness, Outcome};
use corral_core::{ActorId, JobConfig, JobId, Language, PopStatus, RuntimeEnvInfo, TaskId, WorkerId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

fn python() -> PopRequest {
    PopRequest::new(Language::Python, None)
}

fn for_job(job: u32) -> PopRequest {
    PopRequest::new(Language::Python, Some(JobId(job)))
}

fn status(outcome: &Outcome) -> PopStatus {
    outcome.borrow().as_ref().map(|o| o.status).unwrap()
}

fn message(outcome: &Outcome) -> String {
    outcome.borrow().as_ref().map(|o| o.message.clone()).unwrap()
}

fn start_job(h: &mut Harness, job: u32) {
    h.pool.handle_job_started(JobId(job), JobConfig::default());
    h.settle();
}

/// Pop, start, and push back `count` workers so they sit idle in order
fn idle_workers(h: &mut Harness, count: usize) -> Vec<WorkerId> {
    let first = h.spawned().len();
    let outcomes: Vec<_> = (0..count).map(|_| h.pop(python())).collect();
    let workers: Vec<_> = (0..count).map(|i| h.start(first + i)).collect();
    for (outcome, worker) in outcomes.iter().zip(&workers) {
        assert_eq!(&leased(outcome), worker);
    }
    for worker in &workers {
        h.push(worker);
        h.advance(Duration::from_millis(10));
    }
    workers
}

// -----------------------------------------------------------------------------
// Startup concurrency
// -----------------------------------------------------------------------------

#[test]
fn startup_ceiling_caps_concurrent_spawns() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 15;
    let mut h = Harness::new(cfg);

    let outcomes: Vec<_> = (0..16).map(|_| h.pop(python())).collect();
    assert_eq!(h.launcher.spawn_count(), 15);
    assert_eq!(h.pool.num_workers_starting(), 15);
    assert_eq!(h.pool.num_pending_start_requests(), 1);
    assert_eq!(h.pool.num_pending_registration_requests(), 15);

    let worker = h.start(0);
    assert_eq!(leased(&outcomes[0]), worker);
    assert_eq!(h.launcher.spawn_count(), 16);
    assert_eq!(h.pool.num_workers_starting(), 15);
    assert_eq!(h.pool.num_pending_start_requests(), 0);
}

#[test]
fn saturated_pop_without_queueing_fails() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 1;
    let mut h = Harness::new(cfg);

    h.pop(python());
    let refused = h.pop(python().without_queueing());

    assert_eq!(status(&refused), PopStatus::TooManyStartingWorkerProcesses);
    assert_eq!(h.launcher.spawn_count(), 1);
    assert_eq!(h.pool.num_pending_start_requests(), 0);
}

#[test]
fn pending_start_queue_respects_cap() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 1;
    cfg.max_pending_start_requests = Some(1);
    let mut h = Harness::new(cfg);

    h.pop(python());
    let queued = h.pop(python());
    let refused = h.pop(python());

    assert!(queued.borrow().is_none());
    assert_eq!(status(&refused), PopStatus::TooManyStartingWorkerProcesses);
    assert_eq!(h.pool.num_pending_start_requests(), 1);
}

#[test]
fn runtime_env_install_holds_a_startup_slot() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 1;
    let mut h = Harness::new(cfg);
    h.hold_envs = true;
    let env = RuntimeEnvInfo::new(r#"{"pip": ["torch"]}"#);

    let first = h.pop(python().with_runtime_env(env.clone()));
    h.pop(python());
    assert_eq!(h.launcher.spawn_count(), 0);
    assert_eq!(h.pool.num_workers_starting(), 1);
    assert_eq!(h.pool.num_pending_start_requests(), 1);

    h.resolve_envs();
    assert_eq!(h.launcher.spawn_count(), 1);
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    assert_eq!(h.launcher.spawn_count(), 2);
}

#[test]
fn disconnect_of_starting_worker_frees_its_slot() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 1;
    let mut h = Harness::new(cfg);

    h.pop(python());
    h.pop(python());
    assert_eq!(h.launcher.spawn_count(), 1);

    let token = h.token(0);
    let worker = h.register(token);
    h.pool.disconnect_worker(&worker).unwrap();
    h.settle();

    assert_eq!(h.launcher.spawn_count(), 2);
    assert_eq!(h.pool.num_workers_starting(), 1);
    assert_eq!(h.pool.num_pending_registration_requests(), 2);
    assert!(!h.timers.contains_key(&TimerId::ProcessRegistration(token)));
}

#[test]
fn spawn_failure_fails_request_and_releases_slot() {
    let mut h = Harness::new(config());
    h.launcher.set_spawn_failure(Some("exec format error"));

    let outcome = h.pop(python());

    assert_eq!(status(&outcome), PopStatus::SpawnFailed);
    assert!(message(&outcome).contains("exec format error"));
    assert_eq!(h.pool.num_workers_starting(), 0);
    assert_eq!(h.pool.process_count(), 0);
}

// -----------------------------------------------------------------------------
// Acquisition and matching
// -----------------------------------------------------------------------------

#[test]
fn pop_for_unknown_job_fails_without_spawning() {
    let mut h = Harness::new(config());

    let outcome = h.pop(for_job(9));

    assert_eq!(status(&outcome), PopStatus::JobConfigMissing);
    assert_eq!(h.launcher.spawn_count(), 0);
    assert_eq!(h.pool.num_pending_registration_requests(), 0);
}

#[test]
fn pop_for_finished_job_fails() {
    let mut h = Harness::new(config());
    start_job(&mut h, 1);
    h.pool.handle_job_finished(JobId(1));
    h.settle();

    assert_eq!(status(&h.pop(for_job(1))), PopStatus::JobFinished);
    assert_eq!(h.launcher.spawn_count(), 0);
}

#[test]
fn pushed_worker_comes_back_with_its_job_and_env() {
    let mut h = Harness::new(config());
    start_job(&mut h, 1);
    let env = RuntimeEnvInfo::new(r#"{"pip": ["numpy"]}"#);
    let request = || for_job(1).with_runtime_env(env.clone());

    let first = h.pop(request());
    assert_eq!(h.launcher.spawn_count(), 1);
    let vars = h.launcher.last_env().unwrap();
    assert!(vars.contains(&("CORRAL_JOB_ID".to_string(), "00000001".to_string())));
    assert!(vars.contains(&(
        "CORRAL_RUNTIME_ENV_CONTEXT".to_string(),
        format!("ctx:{}", env.serialized)
    )));
    let argv = h.launcher.last_argv().unwrap();
    assert!(argv.contains(&format!("--runtime-env-hash={}", env.hash())));

    let worker = h.start(0);
    let lease = first.borrow().clone().and_then(|o| o.worker).unwrap();
    assert_eq!(lease.worker_id, worker);
    assert_eq!(lease.runtime_env_hash, env.hash());
    assert_eq!(lease.job_id, Some(JobId(1)));

    h.push(&worker);
    assert_eq!(h.pool.idle_worker_count(), 1);

    let second = h.pop(request());
    assert_eq!(leased(&second), worker);
    assert_eq!(h.launcher.spawn_count(), 1);
    let record = h.pool.get_registered_worker(&worker).unwrap();
    assert_eq!(record.runtime_env_hash, env.hash());
    assert_eq!(record.job_id, Some(JobId(1)));
}

#[test]
fn idle_worker_is_not_shared_across_jobs_or_envs() {
    let mut h = Harness::new(config());
    start_job(&mut h, 1);
    start_job(&mut h, 2);

    let first = h.pop(for_job(1));
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    h.push(&worker);

    let other_job = h.pop(for_job(2));
    let other_env = h.pop(for_job(1).with_runtime_env(RuntimeEnvInfo::new(r#"{"conda": "x"}"#)));
    assert!(other_job.borrow().is_none());
    assert!(other_env.borrow().is_none());
    assert_eq!(h.launcher.spawn_count(), 3);
    assert_eq!(h.pool.idle_worker_count(), 1);
}

#[test]
fn root_detached_actor_binds_worker() {
    let mut h = Harness::new(config());
    let actor = ActorId::from("actor-a");

    let first = h.pop(python().with_root_detached_actor(actor.clone()));
    let worker = h.start(0);
    let lease = first.borrow().clone().and_then(|o| o.worker).unwrap();
    assert_eq!(lease.root_detached_actor, Some(actor.clone()));
    h.push(&worker);

    let plain = h.pop(python());
    let stranger = h.pop(python().with_root_detached_actor(ActorId::from("actor-b")));
    assert!(plain.borrow().is_none());
    assert!(stranger.borrow().is_none());

    let same = h.pop(python().with_root_detached_actor(actor));
    assert_eq!(leased(&same), worker);
}

#[test]
fn assigned_task_records_root_detached_actor() {
    let mut h = Harness::new(config());
    h.pop(python());
    let worker = h.start(0);

    h.pool
        .assign_task(&worker, TaskId::from("task-1"), Some(ActorId::from("actor-a")))
        .unwrap();
    let record = h.pool.get_registered_worker(&worker).unwrap();
    assert_eq!(record.assigned_task, Some(TaskId::from("task-1")));
    h.push(&worker);

    assert!(h.pop(python()).borrow().is_none());
    assert!(h.pool.get_registered_worker(&worker).unwrap().assigned_task.is_none());
}

#[test]
fn gpu_and_actor_flags_must_agree_when_both_set() {
    let mut h = Harness::new(config());
    let first = h.pop(python().with_gpu(true).with_actor_worker(false));
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    h.push(&worker);

    assert!(h.pop(python().with_gpu(false)).borrow().is_none());
    assert!(h.pop(python().with_actor_worker(true)).borrow().is_none());
    assert_eq!(leased(&h.pop(python())), worker);
}

#[test]
fn dynamic_options_reach_argv_and_partition_workers() {
    let mut h = Harness::new(config());
    let options = vec!["--max-memory=2g".to_string()];

    let first = h.pop(python().with_dynamic_options(options.clone()));
    assert!(h.launcher.last_argv().unwrap().contains(&options[0]));
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    h.push(&worker);

    assert!(h.pop(python()).borrow().is_none());
    assert_eq!(leased(&h.pop(python().with_dynamic_options(options))), worker);
}

#[test]
fn declined_pop_returns_worker_to_idle() {
    let mut h = Harness::new(config());
    let workers = idle_workers(&mut h, 1);

    let outcome = h.pop_with(python(), false);

    assert_eq!(leased(&outcome), workers[0]);
    assert_eq!(h.pool.idle_worker_count(), 1);
    let record = h.pool.get_registered_worker(&workers[0]).unwrap();
    assert_eq!(record.state, WorkerState::Idle);
}

#[test]
fn pushed_worker_serves_pending_registration_before_pending_start() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 1;
    let mut h = Harness::new(cfg);

    let first = h.pop(python());
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);

    let waiting_registration = h.pop(python());
    let waiting_start = h.pop(python());
    assert_eq!(h.pool.num_pending_start_requests(), 1);

    h.push(&worker);

    assert_eq!(leased(&waiting_registration), worker);
    assert!(waiting_start.borrow().is_none());
    assert_eq!(h.pool.num_pending_start_requests(), 1);
    assert_eq!(h.launcher.spawn_count(), 2);
}

#[test]
fn pushing_idle_worker_is_a_noop() {
    let mut h = Harness::new(config());
    let workers = idle_workers(&mut h, 1);

    h.push(&workers[0]);

    assert_eq!(h.pool.idle_worker_count(), 1);
}

// -----------------------------------------------------------------------------
// Registration
// -----------------------------------------------------------------------------

#[test]
fn registration_rejects_unknown_token_and_duplicates() {
    let mut h = Harness::new(config());
    h.pop(python());
    let worker = h.register(h.token(0));

    assert_eq!(
        h.pool.register_worker(WorkerId::from("ghost"), 1, StartupToken(99)),
        Err(PoolError::UnknownStartupToken(StartupToken(99)))
    );
    assert_eq!(
        h.pool.register_worker(worker.clone(), 1, h.token(0)),
        Err(PoolError::DuplicateWorker(worker))
    );
}

#[test]
fn process_registration_timeout_kills_process_and_fails_request() {
    let mut h = Harness::new(config());
    let outcome = h.pop(python());
    let (token, pid) = h.spawned()[0];
    assert!(h.timers.contains_key(&TimerId::ProcessRegistration(token)));

    h.fire(TimerId::ProcessRegistration(token));

    assert_eq!(h.launcher.killed(), vec![pid]);
    assert_eq!(status(&outcome), PopStatus::WorkerPendingRegistration);
    assert_eq!(h.pool.num_pending_registration_requests(), 0);
    assert_eq!(h.pool.num_workers_starting(), 0);
    assert_eq!(h.pool.process_count(), 0);
    assert_eq!(
        h.pool.register_worker(WorkerId::from("late"), pid, token),
        Err(PoolError::UnknownStartupToken(token))
    );
}

#[test]
fn registration_timeout_is_ignored_once_started() {
    let mut h = Harness::new(config());
    let outcome = h.pop(python());
    let token = h.token(0);
    let worker = h.start(0);

    h.fire(TimerId::ProcessRegistration(token));

    assert_eq!(leased(&outcome), worker);
    assert!(h.launcher.killed().is_empty());
    assert_eq!(h.pool.process_count(), 1);
}

#[test]
fn request_registration_timeout_fails_only_the_request() {
    let mut h = Harness::new(config());
    let outcome = h.pop(python());

    h.fire(TimerId::RequestRegistration(RequestId(0)));

    assert_eq!(status(&outcome), PopStatus::WorkerPendingRegistration);
    assert_eq!(h.pool.num_workers_starting(), 1);

    h.start(0);
    assert_eq!(h.pool.idle_worker_count(), 1);
}

#[test]
fn multi_worker_process_registers_up_to_its_capacity() {
    let mut cfg = config();
    cfg.num_workers_per_process_java = 2;
    let mut h = Harness::new(cfg);

    let outcome = h.pop(PopRequest::new(Language::Java, None));
    let (token, pid) = h.spawned()[0];
    let a = h.register(token);
    let b = h.register(token);
    assert_eq!(
        h.pool.register_worker(WorkerId::from("c"), pid, token),
        Err(PoolError::TooManyWorkers { token, expected: 2 })
    );

    h.announce(&a);
    h.announce(&b);
    assert_eq!(leased(&outcome), a);
    assert_eq!(h.pool.idle_worker_count(), 1);
    assert_eq!(h.pool.num_workers_starting(), 0);
}

// -----------------------------------------------------------------------------
// Idle reclamation
// -----------------------------------------------------------------------------

#[test]
fn soft_limit_evicts_oldest_idle_first() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 5;
    let mut h = Harness::with_cpus(cfg, 3);
    let workers = idle_workers(&mut h, 5);

    h.advance(Duration::from_secs(2));
    h.sweep();

    assert_eq!(
        h.exits,
        vec![(workers[0].clone(), false), (workers[1].clone(), false)]
    );
    assert_eq!(h.pool.idle_worker_count(), 3);
    assert_eq!(h.pool.process_count(), 3);
    assert!(h.pool.get_registered_worker(&workers[0]).is_none());

    h.cpus.set(1);
    h.sweep();
    assert_eq!(h.exits.len(), 4);
    assert_eq!(h.pool.idle_worker_count(), 1);
}

#[test]
fn idle_workers_within_threshold_survive() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 5;
    let mut h = Harness::with_cpus(cfg, 0);
    idle_workers(&mut h, 3);

    h.sweep();

    assert!(h.exits.is_empty());
    assert_eq!(h.pool.idle_worker_count(), 3);
}

#[test]
fn keep_alive_overrides_default_threshold() {
    let mut h = Harness::with_cpus(config(), 0);
    let outcome = h.pop(python().with_keep_alive(Duration::from_secs(10)));
    let worker = h.start(0);
    assert_eq!(leased(&outcome), worker);
    h.push(&worker);

    h.advance(Duration::from_secs(2));
    h.sweep();
    assert!(h.exits.is_empty());

    h.advance(Duration::from_secs(10));
    h.sweep();
    assert_eq!(h.exits, vec![(worker, false)]);
}

#[test]
fn process_exits_as_a_unit_and_only_once() {
    let mut cfg = config();
    cfg.num_workers_per_process_java = 2;
    let mut h = Harness::with_cpus(cfg, 0);
    h.auto_exit_replies = false;

    let outcome = h.pop(PopRequest::new(Language::Java, None));
    let token = h.token(0);
    let a = h.register(token);
    let b = h.register(token);
    h.announce(&a);
    h.announce(&b);
    assert_eq!(leased(&outcome), a);

    h.advance(Duration::from_secs(2));
    h.sweep();
    assert!(h.exits.is_empty(), "busy sibling keeps the process alive");

    h.push(&a);
    h.advance(Duration::from_secs(2));
    h.sweep();
    assert_eq!(h.exits.len(), 2);
    assert!(h.exits.contains(&(a.clone(), false)));
    assert!(h.exits.contains(&(b.clone(), false)));

    h.sweep();
    assert_eq!(h.exits.len(), 2, "exit already in flight");
    assert!(h.pop(PopRequest::new(Language::Java, None)).borrow().is_none());

    for worker in [&a, &b] {
        h.pool.handle_event(PoolEvent::ExitReplied {
            worker_id: worker.clone(),
            accepted: true,
        });
    }
    h.settle();
    assert!(h.pool.get_registered_worker(&a).is_none());
    assert!(h.pool.get_registered_worker(&b).is_none());
    assert_eq!(h.pool.process_count(), 1);
}

#[test]
fn declined_exit_moves_worker_to_back_of_idle_order() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 5;
    let mut h = Harness::with_cpus(cfg, 3);
    let workers = idle_workers(&mut h, 5);
    h.declining.insert(workers[1].clone());

    h.advance(Duration::from_secs(2));
    h.sweep();

    assert_eq!(
        h.exits,
        vec![(workers[0].clone(), false), (workers[1].clone(), false)]
    );
    assert_eq!(h.pool.idle_worker_count(), 4);
    let record = h.pool.get_registered_worker(&workers[1]).unwrap();
    assert_eq!(record.idle_since, Some(h.clock.now()));
    assert!(!record.exit_in_flight);

    for _ in 0..5 {
        h.sweep();
    }
    assert_eq!(h.exits.len(), 3);
    assert_eq!(h.exits[2], (workers[2].clone(), false));
    assert_eq!(h.pool.idle_worker_count(), 3);
    assert!(h.pool.get_registered_worker(&workers[1]).is_some());
}

// -----------------------------------------------------------------------------
// Jobs and runtime envs
// -----------------------------------------------------------------------------

#[test]
fn job_finish_fails_pending_and_force_kills_idle_workers() {
    let mut h = Harness::new(config());
    start_job(&mut h, 1);

    let first = h.pop(for_job(1));
    let pending = h.pop(for_job(1).with_dynamic_options(vec!["--x".to_string()]));
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    h.push(&worker);
    assert!(pending.borrow().is_none());

    h.pool.handle_job_finished(JobId(1));
    h.settle();

    assert_eq!(status(&pending), PopStatus::JobFinished);
    assert_eq!(h.exits, vec![(worker.clone(), true)]);
    assert_eq!(h.pool.idle_worker_count(), 0);
    assert!(h.pool.get_registered_worker(&worker).is_none());
    assert_eq!(h.pool.num_pending_registration_requests(), 0);
}

#[test]
fn job_finish_force_kills_worker_despite_keep_alive() {
    let mut h = Harness::new(config());
    start_job(&mut h, 1);

    let outcome = h.pop(for_job(1).with_keep_alive(Duration::from_secs(10)));
    let worker = h.start(0);
    assert_eq!(leased(&outcome), worker);
    h.push(&worker);

    h.pool.handle_job_finished(JobId(1));
    h.settle();

    assert_eq!(h.exits, vec![(worker.clone(), true)]);
    assert!(h.pool.get_registered_worker(&worker).is_none());
}

#[test]
fn runtime_env_references_net_to_zero() {
    let mut h = Harness::new(config());
    let env = RuntimeEnvInfo::eager(r#"{"conda": "analytics"}"#);
    let job = JobConfig {
        runtime_env: Some(env.clone()),
        ..JobConfig::default()
    };
    h.pool.handle_job_started(JobId(1), job);
    h.settle();
    assert_eq!(h.env_refs(&env.serialized), 1);

    let outcome = h.pop(for_job(1).with_runtime_env(env.clone()));
    assert_eq!(h.env_refs(&env.serialized), 2);
    let worker = h.start(0);
    assert_eq!(leased(&outcome), worker);
    h.push(&worker);

    h.pool.handle_job_finished(JobId(1));
    h.settle();

    assert_eq!(h.env_refs(&env.serialized), 0);
    assert_eq!(h.pool.process_count(), 0);
}

#[test]
fn eager_env_acquired_after_job_finish_is_released() {
    let mut h = Harness::new(config());
    h.hold_envs = true;
    let env = RuntimeEnvInfo::eager(r#"{"pip": ["pandas"]}"#);
    let job = JobConfig {
        runtime_env: Some(env.clone()),
        ..JobConfig::default()
    };
    h.pool.handle_job_started(JobId(1), job);
    h.settle();
    h.pool.handle_job_finished(JobId(1));
    h.settle();

    h.resolve_envs();

    assert_eq!(h.env_refs(&env.serialized), 0);
}

#[test]
fn request_abandoned_during_env_install_releases_env_and_slot() {
    let mut h = Harness::new(config());
    h.hold_envs = true;
    start_job(&mut h, 1);
    let env = RuntimeEnvInfo::new(r#"{"pip": ["scipy"]}"#);

    let outcome = h.pop(for_job(1).with_runtime_env(env.clone()));
    h.pool.handle_job_finished(JobId(1));
    h.settle();
    assert_eq!(status(&outcome), PopStatus::JobFinished);

    h.resolve_envs();

    assert_eq!(h.launcher.spawn_count(), 0);
    assert_eq!(h.pool.num_workers_starting(), 0);
    assert_eq!(h.env_refs(&env.serialized), 0);
}

#[test]
fn runtime_env_failure_surfaces_gate_message() {
    let mut h = Harness::new(config());
    let env = RuntimeEnvInfo::new(r#"{"conda": "broken"}"#);
    h.env_failures
        .insert(env.serialized.clone(), "conda solve failed".to_string());

    let outcome = h.pop(python().with_runtime_env(env));

    assert_eq!(status(&outcome), PopStatus::RuntimeEnvCreationFailed);
    assert_eq!(message(&outcome), "conda solve failed");
    assert_eq!(h.launcher.spawn_count(), 0);
    assert_eq!(h.pool.num_workers_starting(), 0);
}

// -----------------------------------------------------------------------------
// Prestart and drivers
// -----------------------------------------------------------------------------

#[test]
fn prestart_is_capped_by_soft_limit_and_counts_starting() {
    let mut h = Harness::with_cpus(config(), 2);

    h.pool
        .prestart_workers(Language::Python, RuntimeEnvInfo::default(), 5);
    h.settle();
    assert_eq!(h.launcher.spawn_count(), 2);

    h.pool
        .prestart_workers(Language::Python, RuntimeEnvInfo::default(), 5);
    h.settle();
    assert_eq!(h.launcher.spawn_count(), 2);

    h.start(0);
    h.pool
        .prestart_workers(Language::Python, RuntimeEnvInfo::default(), 5);
    h.settle();
    assert_eq!(h.launcher.spawn_count(), 2);
    assert_eq!(h.pool.idle_worker_count(), 1);
}

#[test]
fn first_python_driver_waits_for_prestarted_workers() {
    let mut cfg = config();
    cfg.num_prestart_python_workers = 2;
    let mut h = Harness::new(cfg);
    let ready = Rc::new(Cell::new(false));
    let flag = ready.clone();

    h.pool
        .register_driver(
            WorkerId::from("driver-1"),
            500,
            Language::Python,
            JobId(1),
            JobConfig::default(),
            Box::new(move || flag.set(true)),
        )
        .unwrap();
    h.settle();
    assert!(!ready.get());
    assert_eq!(h.launcher.spawn_count(), 2);
    assert!(h.pool.get_registered_driver(&WorkerId::from("driver-1")).is_some());

    h.start(0);
    assert!(!ready.get());
    h.start(1);
    assert!(ready.get());

    let second = Rc::new(Cell::new(false));
    let flag = second.clone();
    h.pool
        .register_driver(
            WorkerId::from("driver-2"),
            501,
            Language::Python,
            JobId(2),
            JobConfig::default(),
            Box::new(move || flag.set(true)),
        )
        .unwrap();
    assert!(second.get());

    let outcome = h.pop(for_job(1));
    assert!(leased(&outcome).as_str().starts_with("w-"));
    assert_eq!(h.launcher.spawn_count(), 2);
}

#[test]
fn failed_prestart_still_completes_first_driver() {
    let mut cfg = config();
    cfg.num_prestart_python_workers = 3;
    let mut h = Harness::new(cfg);
    h.launcher.set_spawn_failure(Some("no such file"));
    let ready = Rc::new(Cell::new(false));
    let flag = ready.clone();

    h.pool
        .register_driver(
            WorkerId::from("driver-1"),
            500,
            Language::Python,
            JobId(1),
            JobConfig::default(),
            Box::new(move || flag.set(true)),
        )
        .unwrap();

    assert!(ready.get());
}

#[test]
fn drivers_are_not_pooled() {
    let mut h = Harness::new(config());
    let driver = WorkerId::from("driver-1");
    h.pool
        .register_driver(
            driver.clone(),
            500,
            Language::Java,
            JobId(4),
            JobConfig::default(),
            Box::new(|| {}),
        )
        .unwrap();

    assert!(h.pool.get_registered_worker(&driver).is_none());
    assert!(matches!(
        h.pool.push_worker(&driver),
        Err(PoolError::WrongKind { .. })
    ));
    assert_eq!(h.pool.idle_worker_count(), 0);

    h.pool.disconnect_worker(&driver).unwrap();
    assert!(h.pool.get_registered_driver(&driver).is_none());
}

// -----------------------------------------------------------------------------
// I/O workers
// -----------------------------------------------------------------------------

fn io_sink() -> (Rc<RefCell<Vec<WorkerId>>>, impl Fn() -> crate::io_pool::IoCallback) {
    let got = Rc::new(RefCell::new(Vec::new()));
    let sink = got.clone();
    let make = move || -> crate::io_pool::IoCallback {
        let sink = sink.clone();
        Box::new(move |worker| sink.borrow_mut().push(worker))
    };
    (got, make)
}

#[test]
fn spill_pool_is_capped_and_recycles_workers() {
    let mut cfg = config();
    cfg.max_io_workers = 2;
    let mut h = Harness::new(cfg);
    let (got, callback) = io_sink();

    for _ in 0..3 {
        h.pool.pop_spill_worker(callback());
    }
    h.settle();
    assert_eq!(h.launcher.spawn_count(), 2);
    assert!(h
        .launcher
        .last_argv()
        .unwrap()
        .contains(&"--worker-kind=spill".to_string()));
    assert_eq!(h.pool.num_workers_starting(), 0);

    let a = h.start(0);
    let b = h.start(1);
    assert_eq!(*got.borrow(), vec![a.clone(), b.clone()]);
    assert_eq!(h.pool.io_worker_counts(IoWorkerKind::Spill).waiting, 1);

    h.pool.push_spill_worker(&a).unwrap();
    assert_eq!(got.borrow().len(), 3);
    h.pool.push_spill_worker(&a).unwrap();
    let stats = h.pool.io_worker_counts(IoWorkerKind::Spill);
    assert_eq!((stats.started, stats.idle, stats.waiting), (2, 1, 0));
}

#[test]
fn delete_borrows_from_the_larger_io_pool_and_prefers_spill_on_tie() {
    let mut h = Harness::new(config());
    let (got, callback) = io_sink();

    h.pool.pop_restore_worker(callback());
    h.pool.pop_restore_worker(callback());
    h.settle();
    let r1 = h.start(0);
    let r2 = h.start(1);
    h.pool.pop_spill_worker(callback());
    h.settle();
    let s1 = h.start(2);
    for worker in [&r1, &r2] {
        h.pool.push_restore_worker(worker).unwrap();
    }
    h.pool.push_spill_worker(&s1).unwrap();
    got.borrow_mut().clear();

    h.pool.pop_delete_worker(callback());
    assert_eq!(*got.borrow(), vec![r1.clone()]);

    h.pool.pop_delete_worker(callback());
    assert_eq!(got.borrow().last(), Some(&s1));

    h.pool.push_delete_worker(&r1).unwrap();
    h.pool.push_delete_worker(&s1).unwrap();
    assert_eq!(h.pool.io_worker_counts(IoWorkerKind::Restore).idle, 2);
    assert_eq!(h.pool.io_worker_counts(IoWorkerKind::Spill).idle, 1);
}

#[test]
fn io_worker_disconnect_restarts_for_waiters() {
    let mut cfg = config();
    cfg.max_io_workers = 1;
    let mut h = Harness::new(cfg);
    let (got, callback) = io_sink();

    h.pool.pop_restore_worker(callback());
    h.pool.pop_restore_worker(callback());
    h.settle();
    assert_eq!(h.launcher.spawn_count(), 1);
    let worker = h.start(0);
    assert_eq!(got.borrow().len(), 1);

    h.pool.disconnect_worker(&worker).unwrap();
    h.settle();

    assert_eq!(h.launcher.spawn_count(), 2);
    assert!(h
        .launcher
        .last_argv()
        .unwrap()
        .contains(&"--worker-kind=restore".to_string()));
}

// -----------------------------------------------------------------------------
// Stats and shutdown
// -----------------------------------------------------------------------------

#[test]
fn stats_reflect_pool_contents() {
    let mut cfg = config();
    cfg.max_startup_concurrency = 2;
    let mut h = Harness::with_cpus(cfg, 6);
    let env = RuntimeEnvInfo::new(r#"{"pip": ["a"]}"#);

    let first = h.pop(python().with_runtime_env(env.clone()));
    let worker = h.start(0);
    assert_eq!(leased(&first), worker);
    h.push(&worker);
    h.pop(python());
    h.pop(python().with_runtime_env(RuntimeEnvInfo::new("{\"pip\": [\"b\"]}")));
    h.pop(python().with_runtime_env(RuntimeEnvInfo::new("{\"pip\": [\"c\"]}")));

    let stats = h.pool.stats();
    assert_eq!(stats.num_workers_starting, 2);
    assert_eq!(stats.num_pending_start_requests, 1);
    assert_eq!(stats.num_pending_registration_requests, 2);
    assert_eq!(stats.num_processes, 3);
    assert_eq!(stats.num_registered_workers, 1);
    assert_eq!(stats.num_idle_workers, 1);
    assert_eq!(stats.soft_limit, 6);
    assert_eq!(stats.idle_by_runtime_env_hash.get(&env.hash()), Some(&1));
}

#[test]
fn shutdown_kills_processes_and_fails_pending() {
    let mut h = Harness::new(config());
    let outcome = h.pop(python());
    let pid = h.spawned()[0].1;

    h.pool.shutdown();
    h.settle();

    assert_eq!(status(&outcome), PopStatus::PoolShuttingDown);
    assert_eq!(h.launcher.killed(), vec![pid]);
    assert_eq!(h.pool.process_count(), 0);
    assert_eq!(h.pool.num_workers_starting(), 0);
}
