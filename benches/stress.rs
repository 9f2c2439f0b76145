use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hotelplan::{Catalog, Event, Planner, Resource, ResourceDemand, Scheduler, SnapshotStore, Span};

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn catalog() -> Catalog {
    let quantities = [1, 1, 1, 1, 1, 5, 5, 5, 10, 10];
    quantities
        .iter()
        .enumerate()
        .map(|(i, &q)| Resource::item(&format!("recurso-{i}"), q).unwrap())
        .collect()
}

fn booking(name: String, resource: &str, start: i64) -> Event {
    Event::new(&name, start, start + HOUR)
        .unwrap()
        .with_resource(resource, 1)
        .unwrap()
}

async fn phase1_sequential() {
    let planner = Planner::new(Scheduler::new(catalog()));
    let n = 20_000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let e = booking(format!("seq-{i}"), "recurso-9", (i as i64 / 10) * HOUR);
        let t = Instant::now();
        planner.add_event(e).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} events in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("admission latency", &mut latencies);
}

async fn phase2_concurrent() {
    let planner = Arc::new(Planner::new(Scheduler::new(catalog())));
    let n_tasks = 10;
    let n_per_task = 1_000;

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tasks {
        let planner = planner.clone();
        handles.push(tokio::spawn(async move {
            let resource = format!("recurso-{t}");
            let mut admitted = 0usize;
            for j in 0..n_per_task {
                // Overlapping pairs, so single-unit resources reject half.
                let e = booking(format!("con-{t}-{j}"), &resource, (j as i64 / 2) * HOUR);
                if planner.add_event(e).await.is_ok() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let mut admitted = 0;
    for h in handles {
        admitted += h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts = {total} total ({admitted} admitted) in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load() {
    let planner = Arc::new(Planner::new(Scheduler::new(catalog())));
    for i in 0..2_000 {
        planner
            .add_event(booking(format!("pre-{i}"), "recurso-8", (i as i64 / 5) * HOUR))
            .await
            .unwrap();
    }

    // Writer tasks: continuously add events in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let planner = planner.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = (w as i64 * 100_000 + i) * HOUR;
                let _ = planner
                    .add_event(booking(format!("w-{w}-{i}"), "recurso-9", s))
                    .await;
                i += 1;
                tokio::task::yield_now().await;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let planner = planner.clone();
        reader_handles.push(tokio::spawn(async move {
            let demand = [ResourceDemand::new("recurso-8", 5).unwrap()];
            let mut usage = Vec::with_capacity(reads_per_reader);
            let mut search = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                let _ = planner.usage_intervals("recurso-8").await;
                usage.push(t.elapsed());

                let from = ((r * reads_per_reader + i) as i64 % 400) * HOUR;
                let t = Instant::now();
                let _ = planner
                    .find_next_available(HOUR, &demand, from, from + 48 * HOUR, 15)
                    .await;
                search.push(t.elapsed());
            }
            (usage, search)
        }));
    }

    let mut usage = Vec::new();
    let mut search = Vec::new();
    for h in reader_handles {
        let (u, s) = h.await.unwrap();
        usage.extend(u);
        search.extend(s);
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("usage_intervals", &mut usage);
    print_latency("find_next_available", &mut search);
    let free = planner
        .free_windows("recurso-8", Span::new(0, 500 * HOUR), 1)
        .await;
    println!("  free windows on recurso-8: {}", free.len());
}

async fn phase4_snapshot() {
    let dir = std::env::temp_dir().join(format!("hotelplan_bench_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("events.json");

    let planner = Planner::new(Scheduler::new(catalog())).with_events_store(SnapshotStore::new(&path));
    for i in 0..10_000 {
        planner
            .add_event(booking(format!("snap-{i}"), "recurso-9", (i as i64 / 10) * HOUR))
            .await
            .unwrap();
    }

    let t = Instant::now();
    let saved = planner.save_snapshot().await.unwrap();
    println!("  saved {saved} events in {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);

    let t = Instant::now();
    let loaded = planner.load_snapshot(true).await.unwrap();
    println!(
        "  validated load of {loaded} events in {:.2}ms",
        t.elapsed().as_secs_f64() * 1000.0
    );

    let t = Instant::now();
    let loaded = planner.load_snapshot(false).await.unwrap();
    println!(
        "  trusted load of {loaded} events in {:.2}ms",
        t.elapsed().as_secs_f64() * 1000.0
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::main]
async fn main() {
    println!("=== hotelplan stress benchmark ===\n");

    println!("[phase 1] sequential admission throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent admission throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] snapshot save / load");
    phase4_snapshot().await;

    println!("\n=== done ===");
}
