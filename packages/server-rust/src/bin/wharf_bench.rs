//! In-process load generator: boots a pooled deployment backed by memory
//! pools and drives it with producer, consumer and observer workers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::{debug, info};
use wharf_core::{ListOptions, Metadata, NewClaim, NewMessage, PoolRecord};
use wharf_server::service::{Operation, OperationResponse, ServerConfig};
use wharf_server::telemetry::init_tracing;
use wharf_server::{bootstrap, Deployment};

#[derive(Parser, Debug)]
#[command(name = "wharf-bench")]
#[command(about = "Load generator for pooled queue storage")]
struct Args {
    /// Memory pools to register
    #[arg(long, env = "WHARF_BENCH_POOLS", default_value = "4")]
    pools: usize,

    /// Queues shared by all workers
    #[arg(long, env = "WHARF_BENCH_QUEUES", default_value = "8")]
    queues: usize,

    /// Queue name prefix
    #[arg(long, default_value = "bench-queue")]
    queue_prefix: String,

    /// Concurrent producer workers
    #[arg(long, default_value = "4")]
    producers: usize,

    /// Concurrent consumer workers (claim, then delete)
    #[arg(long, default_value = "4")]
    consumers: usize,

    /// Concurrent observer workers (list)
    #[arg(long, default_value = "2")]
    observers: usize,

    /// Run time in seconds
    #[arg(long, env = "WHARF_BENCH_DURATION", default_value = "5")]
    duration: u64,

    /// Messages per post request
    #[arg(long, default_value = "5")]
    messages_per_post: usize,

    /// Messages per claim request
    #[arg(long, default_value = "10")]
    messages_per_claim: usize,

    /// Messages per list request
    #[arg(long, default_value = "10")]
    messages_per_list: usize,

    /// Print human-readable statistics instead of JSON
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Producer,
    Consumer,
    Observer,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Observer => "observer",
        }
    }
}

/// Per-worker counters; merged per role once the run ends.
struct WorkerStats {
    role: Role,
    requests: u64,
    failures: u64,
    /// Messages posted, claimed or listed.
    messages: u64,
    /// Request latency in microseconds.
    latency: Histogram<u64>,
}

impl WorkerStats {
    fn new(role: Role) -> Result<Self> {
        Ok(Self {
            role,
            requests: 0,
            failures: 0,
            messages: 0,
            latency: Histogram::new_with_bounds(1, 60_000_000, 3)
                .map_err(|err| anyhow!("creating latency histogram: {err:?}"))?,
        })
    }

    fn record(&mut self, started: Instant, ok: bool) {
        self.requests += 1;
        if !ok {
            self.failures += 1;
        }
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.latency.saturating_record(micros.max(1));
    }

    fn merge(&mut self, other: &WorkerStats) -> Result<()> {
        self.requests += other.requests;
        self.failures += other.failures;
        self.messages += other.messages;
        self.latency
            .add(&other.latency)
            .map_err(|err| anyhow!("merging latency histograms: {err:?}"))
    }

    #[allow(clippy::cast_precision_loss)]
    fn summary(&self, elapsed: Duration) -> Value {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let ms = |micros: u64| micros as f64 / 1000.0;
        json!({
            "total_reqs": self.requests,
            "successful_reqs": self.requests - self.failures,
            "reqs_per_sec": self.requests as f64 / secs,
            "messages": self.messages,
            "messages_per_sec": self.messages as f64 / secs,
            "ms_per_req": self.latency.mean() / 1000.0,
            "ms_p50": ms(self.latency.value_at_quantile(0.5)),
            "ms_p99": ms(self.latency.value_at_quantile(0.99)),
            "ms_max": ms(self.latency.max()),
        })
    }
}

/// Shared handle each worker drives the service through.
struct Bench {
    deployment: Deployment,
    queues: Vec<String>,
    project: String,
    call_ids: AtomicU64,
    deadline: Instant,
}

impl Bench {
    async fn call(&self, op: Operation) -> Option<OperationResponse> {
        match self.deployment.service.clone().oneshot(op).await {
            Ok(resp) => Some(resp),
            Err(err) => {
                debug!(error = %err, "bench request failed");
                None
            }
        }
    }

    fn ctx(&self) -> wharf_server::service::OperationContext {
        self.deployment
            .context(self.call_ids.fetch_add(1, Ordering::Relaxed), &*self.project)
    }

    fn pick_queue(&self, rng: &mut StdRng) -> String {
        self.queues[rng.random_range(0..self.queues.len())].clone()
    }
}

async fn produce(bench: Arc<Bench>, batch: usize) -> Result<WorkerStats> {
    let mut stats = WorkerStats::new(Role::Producer)?;
    let mut rng = StdRng::from_rng(&mut rand::rng());
    while Instant::now() < bench.deadline {
        let messages = (0..batch)
            .map(|_| NewMessage {
                body: json!({ "event": "bench", "value": rng.random::<u32>() }),
                ttl: 300,
            })
            .collect();
        let op = Operation::PostMessages {
            ctx: bench.ctx(),
            queue: bench.pick_queue(&mut rng),
            messages,
        };
        let started = Instant::now();
        let resp = bench.call(op).await;
        if let Some(OperationResponse::Posted(ids)) = &resp {
            stats.messages += ids.len() as u64;
        }
        stats.record(started, resp.is_some());
    }
    Ok(stats)
}

async fn consume(bench: Arc<Bench>, limit: usize) -> Result<WorkerStats> {
    let mut stats = WorkerStats::new(Role::Consumer)?;
    let mut rng = StdRng::from_rng(&mut rand::rng());
    while Instant::now() < bench.deadline {
        let queue = bench.pick_queue(&mut rng);
        let op = Operation::CreateClaim {
            ctx: bench.ctx(),
            queue: queue.clone(),
            claim: NewClaim {
                ttl: 60,
                grace: 60,
                limit: Some(limit),
            },
        };
        let started = Instant::now();
        let resp = bench.call(op).await;
        stats.record(started, resp.is_some());

        let Some(OperationResponse::Claimed(batch)) = resp else {
            continue;
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            continue;
        }
        stats.messages += batch.messages.len() as u64;
        for message in batch.messages {
            let op = Operation::DeleteMessage {
                ctx: bench.ctx(),
                queue: queue.clone(),
                message_id: message.id,
                claim_id: batch.claim_id.clone(),
            };
            let started = Instant::now();
            let ok = bench.call(op).await.is_some();
            stats.record(started, ok);
        }
    }
    Ok(stats)
}

async fn observe(bench: Arc<Bench>, limit: usize) -> Result<WorkerStats> {
    let mut stats = WorkerStats::new(Role::Observer)?;
    let mut rng = StdRng::from_rng(&mut rand::rng());
    while Instant::now() < bench.deadline {
        let op = Operation::ListMessages {
            ctx: bench.ctx(),
            queue: bench.pick_queue(&mut rng),
            options: ListOptions {
                limit,
                include_claimed: true,
                ..ListOptions::default()
            },
        };
        let started = Instant::now();
        let resp = bench.call(op).await;
        if let Some(OperationResponse::Page(page)) = &resp {
            stats.messages += page.messages.len() as u64;
        }
        stats.record(started, resp.is_some());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    Ok(stats)
}

async fn prepare(args: &Args) -> Result<Bench> {
    let config = ServerConfig {
        max_concurrent_operations: 100_000,
        ..ServerConfig::pooled()
    };
    let deployment = bootstrap(&config)?;
    let project = "bench".to_string();

    for i in 0..args.pools {
        let op = Operation::CreatePool {
            ctx: deployment.context(0, &*project),
            pool: PoolRecord::new(format!("pool-{i}"), format!("memory://pool-{i}"), 100),
        };
        deployment.service.clone().oneshot(op).await?;
    }

    let mut queues = Vec::with_capacity(args.queues);
    for i in 0..args.queues {
        let name = format!("{}-{i}", args.queue_prefix);
        let op = Operation::CreateQueue {
            ctx: deployment.context(0, &*project),
            queue: name.clone(),
            metadata: Metadata::new(),
        };
        deployment.service.clone().oneshot(op).await?;
        queues.push(name);
    }
    info!(pools = args.pools, queues = queues.len(), "deployment ready");

    Ok(Bench {
        deployment,
        queues,
        project,
        call_ids: AtomicU64::new(1),
        deadline: Instant::now() + Duration::from_secs(args.duration),
    })
}

fn print_verbose(name: &str, stats: &Value) {
    println!("{}", name.to_uppercase());
    println!("{}", "=".repeat(name.len()));
    if let Some(fields) = stats.as_object() {
        for (key, value) in fields {
            match value.as_f64() {
                Some(n) => println!("{key}: {n:.1}"),
                None => println!("{key}: {value}"),
            }
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("warn", args.log_json);

    if args.pools == 0 || args.queues == 0 {
        bail!("--pools and --queues must both be at least 1");
    }

    let bench = Arc::new(prepare(&args).await?);
    let started = Instant::now();

    let mut workers = JoinSet::new();
    for _ in 0..args.producers {
        workers.spawn(produce(Arc::clone(&bench), args.messages_per_post));
    }
    for _ in 0..args.consumers {
        workers.spawn(consume(Arc::clone(&bench), args.messages_per_claim));
    }
    for _ in 0..args.observers {
        workers.spawn(observe(Arc::clone(&bench), args.messages_per_list));
    }

    let mut merged: BTreeMap<Role, WorkerStats> = BTreeMap::new();
    while let Some(joined) = workers.join_next().await {
        let stats = joined??;
        match merged.get_mut(&stats.role) {
            Some(total) => total.merge(&stats)?,
            None => {
                merged.insert(stats.role, stats);
            }
        }
    }
    let elapsed = started.elapsed();

    let report: serde_json::Map<String, Value> = merged
        .values()
        .map(|stats| (stats.role.as_str().to_string(), stats.summary(elapsed)))
        .collect();

    if args.verbose {
        for (name, stats) in &report {
            print_verbose(name, stats);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&Value::Object(report))?);
    }
    Ok(())
}
