/*
 * Copyright (C) 2021 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Measure the throughput of trivial, empty transactions between worker
//! threads going through real proxy handles.

use hwbinder::parcel::Parcel;
use hwbinder::{
    declare_binder_interface, Binder, IBinder, Interface, ProcessState, SpIBinder, Status,
    StatusCode, TransactionCode,
};

use std::env;
use std::error::Error;
use std::fmt;
use std::mem;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

const NUM_BUCKETS: u64 = 128;

static MAX_TIME_BUCKET: AtomicU64 = AtomicU64::new(50 * 1_000_000);
static TIME_PER_BUCKET: AtomicU64 = AtomicU64::new(50 * 1_000_000 / NUM_BUCKETS);

struct ProcResults {
    buckets: [u32; NUM_BUCKETS as usize],
    worst: u64,
    best: u64,
    transactions: u64,
    long_transactions: u64,
    total_time: u64,
}

impl ProcResults {
    fn new() -> Self {
        Self {
            buckets: [0; NUM_BUCKETS as usize],
            worst: 0,
            best: MAX_TIME_BUCKET.load(Ordering::Relaxed),
            transactions: 0,
            long_transactions: 0,
            total_time: 0,
        }
    }

    fn combine(mut self, other: &ProcResults) -> Self {
        self.buckets
            .iter_mut()
            .zip(other.buckets.iter())
            .for_each(|(bucket, other)| *bucket += other);
        Self {
            buckets: self.buckets,
            worst: self.worst.max(other.worst),
            best: self.best.min(other.best),
            transactions: self.transactions + other.transactions,
            long_transactions: self.long_transactions + other.long_transactions,
            total_time: self.total_time + other.total_time,
        }
    }

    fn add_time(&mut self, time: u64) {
        if time > MAX_TIME_BUCKET.load(Ordering::Relaxed) {
            self.long_transactions += 1;
        }
        let time_per_bucket = TIME_PER_BUCKET.load(Ordering::Relaxed);
        self.buckets[(NUM_BUCKETS as usize - 1).min((time / time_per_bucket) as usize)] += 1;
        self.best = time.min(self.best);
        self.worst = time.max(self.worst);
        self.transactions += 1;
        self.total_time += time;
    }
}

impl fmt::Display for ProcResults {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        if self.long_transactions > 0 {
            write!(
                f,
                "{}% of transactions took longer than estimated max latency. ",
                self.long_transactions as f64 / self.transactions as f64 * 100.0,
            )?;
            writeln!(
                f,
                "Consider setting -m to be higher than {} microseconds",
                self.worst / 1000,
            )?;
        }

        let best = self.best as f64 / 1.0E6;
        let worst = self.worst as f64 / 1.0E6;
        let average = self.total_time as f64 / self.transactions as f64 / 1.0E6;
        writeln!(
            f,
            "average: {}ms worst: {}ms best: {}ms",
            average, worst, best
        )?;

        let mut cur_total = 0u64;
        let time_per_bucket_ms = TIME_PER_BUCKET.load(Ordering::Relaxed) as f64 / 1.0E6;
        for (i, bucket) in self.buckets.iter().copied().enumerate() {
            let cur_time = time_per_bucket_ms * i as f64 + 0.5 * time_per_bucket_ms;
            let transactions = self.transactions as f64;
            let flast_total = cur_total as f64;
            let fnew_total = (cur_total + bucket as u64) as f64;
            if flast_total < 0.5 * transactions && fnew_total >= 0.5 * transactions {
                write!(f, "50%: {} ", cur_time)?;
            }
            if flast_total < 0.9 * transactions && fnew_total >= 0.9 * transactions {
                write!(f, "90%: {} ", cur_time)?;
            }
            if flast_total < 0.95 * transactions && fnew_total >= 0.95 * transactions {
                write!(f, "95%: {} ", cur_time)?;
            }
            if flast_total < 0.99 * transactions && fnew_total >= 0.99 * transactions {
                write!(f, "99%: {} ", cur_time)?;
            }
            cur_total += bucket as u64;
        }
        writeln!(f)
    }
}

/// Marker trait for binder workers
pub trait IBinderWorker: Interface {
    /// Peform a nop transaction with given payload size
    fn nop(&self, size: i32) -> Result<(), Status>;
}

struct BinderWorkerService;

impl Interface for BinderWorkerService {}
impl IBinderWorker for BinderWorkerService {
    fn nop(&self, _size: i32) -> Result<(), Status> {
        Ok(())
    }
}

impl BinderWorkerService {
    const BINDER_NOP: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION;
}

fn on_transact(
    _service: &dyn IBinderWorker,
    code: TransactionCode,
    _data: &Parcel,
    _reply: &mut Parcel,
) -> hwbinder::Result<()> {
    match code {
        BinderWorkerService::BINDER_NOP => Ok(()),
        _ => Err(StatusCode::UNKNOWN_TRANSACTION),
    }
}

declare_binder_interface! {
    IBinderWorker["BinderWorkerService"] {
        native: BnBinderWorker(on_transact),
        proxy: BpBinderWorker,
    }
}

impl IBinderWorker for BpBinderWorker {
    fn nop(&self, mut size: i32) -> Result<(), Status> {
        self.as_binder().transact(BinderWorkerService::BINDER_NOP, 0, |data| {
            while size >= mem::size_of::<u32>() as i32 {
                data.write(&0i32)?;
                size -= mem::size_of::<u32>() as i32;
            }
            Ok(())
        })?;
        Ok(())
    }
}
impl IBinderWorker for Binder<BnBinderWorker> {
    fn nop(&self, size: i32) -> Result<(), Status> {
        self.0.nop(size)
    }
}

/// Splitmix-style generator for picking transaction targets.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn generate_service_name(num: i32) -> String {
    format!("binderWorker{}", num)
}

/// Resolve a worker service as a real proxy so every call goes through a
/// transaction instead of short-circuiting into the local object.
fn remote_worker(name: &str) -> hwbinder::Result<Box<dyn IBinderWorker>> {
    let service = hwbinder::get_service(name)?;
    let mut parcel = Parcel::new();
    parcel.write(&service)?;
    parcel.set_data_position(0)?;
    let remote: SpIBinder = parcel.read()?;
    remote.into_interface()
}

fn worker_fx(
    num: i32,
    worker_count: i32,
    iterations: i32,
    payload_size: i32,
    cs_pair: bool,
    barrier: Arc<Barrier>,
) -> ProcResults {
    let binder_native = BnBinderWorker::new_binder(BinderWorkerService);
    hwbinder::add_service(&generate_service_name(num), binder_native.as_binder()).unwrap();

    // Wait until every worker has published its service.
    barrier.wait();

    // If client/server pairs, then half the workers are
    // servers and half are clients
    let server_count = if cs_pair {
        worker_count / 2
    } else {
        worker_count
    };

    // Get references to other binder services.
    let mut workers = vec![];
    for i in 0..server_count {
        if num != i {
            workers.push(remote_worker(&generate_service_name(i)).unwrap());
        }
    }

    let mut rng = Rng(num as u64 + 1);
    let mut results = ProcResults::new();
    for i in 0..iterations {
        let target = if cs_pair {
            (num % server_count) as usize
        } else {
            rng.next() as usize % workers.len()
        };

        let start = Instant::now();
        let reply = workers[target].nop(payload_size);
        results.add_time(start.elapsed().as_nanos() as u64);

        if let Err(e) = reply {
            eprintln!("worker {} failed {} i : {}", num, e, i);
            process::exit(1);
        }
    }

    results
}

fn run_main(
    iterations: i32,
    worker_count: i32,
    payload_size: i32,
    cs_pair: bool,
    training_round: bool,
) {
    ProcessState::start_thread_pool();

    // Create all the workers and wait for them to register.
    let barrier = Arc::new(Barrier::new(worker_count as usize + 1));
    let mut workers = Vec::with_capacity(worker_count as usize);
    for num in 0..worker_count {
        let barrier = barrier.clone();
        workers.push(thread::spawn(move || {
            worker_fx(num, worker_count, iterations, payload_size, cs_pair, barrier)
        }));
    }

    // Run the workers and wait for completion.
    println!("waiting for workers to complete");
    let start = Instant::now();
    barrier.wait();
    let mut tot_results = ProcResults::new();
    for worker in workers {
        let results = worker.join().expect("worker thread panicked");
        tot_results = ProcResults::combine(tot_results, &results);
    }
    let duration = start.elapsed();

    let iterations_per_sec =
        (iterations * worker_count) as f64 / (duration.as_nanos() as f64 / 1.0E9);
    println!("iterations per sec: {}", iterations_per_sec);

    if training_round {
        // sets max_time_bucket to 2 * m_worst from the training round.
        // Also needs to adjust time_per_bucket accordingly.
        println!(
            "Max latency during training: {}ms",
            tot_results.worst as f64 / 1.0E6
        );
        MAX_TIME_BUCKET.store(2 * tot_results.worst, Ordering::Relaxed);
        TIME_PER_BUCKET.store(2 * tot_results.worst / NUM_BUCKETS, Ordering::Relaxed);
    } else {
        println!("{}", tot_results);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut workers = 2;
    let mut iterations = 10000;
    let mut payload_size = 0;
    let mut cs_pair = false;
    let mut training_round = false;

    let args: Vec<_> = env::args().collect();

    for i in 1..args.len() {
        match args[i].as_str() {
            "--help" => {
                println!("Usage: throughput [OPTIONS]");
                println!("\t-i N    : Specify number of iterations.");
                println!("\t-m N    : Specify expected max latency in microseconds.");
                println!("\t-p      : Split workers into client/server pairs.");
                println!("\t-s N    : Specify payload size.");
                println!("\t-t      : Run training round.");
                println!("\t-w N    : Specify total number of workers.");
                return Ok(());
            }
            "-w" => {
                workers = args[i + 1].parse()?;
            }
            "-i" => {
                iterations = args[i + 1].parse()?;
            }
            "-s" => {
                payload_size = args[i + 1].parse()?;
            }
            "-p" => {
                // client/server pairs instead of spreading
                // requests to all workers. If true, half
                // the workers become clients and half servers
                cs_pair = true;
            }
            "-t" => {
                // Run one training round before actually collecting data
                // to get an approximation of max latency.
                training_round = true;
            }
            "-m" => {
                // Caller specified the max latency in microseconds.
                // No need to run training round in this case.
                let max_time: u64 = args[i + 1].parse()?;
                MAX_TIME_BUCKET.store(max_time * 1000, Ordering::Relaxed);
                TIME_PER_BUCKET.store(max_time * 1000 / NUM_BUCKETS, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    if training_round {
        println!("Start training round");
        run_main(iterations, workers, payload_size, cs_pair, true);
        println!("Completed training round\n");
    }

    run_main(iterations, workers, payload_size, cs_pair, false);

    Ok(())
}
