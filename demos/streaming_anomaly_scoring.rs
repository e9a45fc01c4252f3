//! Streaming anomaly scoring over a noisy periodic signal.
//!
//! Each value is scored first and only then fed to the model, so every
//! score reflects the stream as it was before the observation arrived.
//! A level shift is injected two thirds of the way in; its first few
//! points stand out clearly before the model absorbs the new level.
//!
//! Run with `cargo run --example streaming_anomaly_scoring`.

use cutforest::common::syntheticdata;
use cutforest::ForestOptions;

fn main() {
    let shingle_size = 8;
    let stream_length = 1200usize;
    let anomaly_at = 800usize;

    let mut values = syntheticdata::cosine(stream_length, 120, 40.0, 2.0, 7);
    for value in values.iter_mut().skip(anomaly_at) {
        *value += 60.0;
    }

    let mut forest = ForestOptions::new(shingle_size)
        .shingle_size(shingle_size)
        .internal_shingling(true)
        .sample_size(256)
        .number_of_trees(30)
        .random_seed(42)
        .build()
        .expect("valid configuration");

    let mut peak_score = 0.0f64;
    let mut peak_index = 0usize;
    for (i, &value) in values.iter().enumerate() {
        let score = forest.score(&[value]).expect("scoring cannot fail here");
        forest.update(&[value]).expect("update cannot fail here");
        if score > peak_score {
            peak_score = score;
            peak_index = i;
        }
        if i >= anomaly_at && i < anomaly_at + 3 {
            println!("index {:4}  value {:8.2}  score {:.3}  <- injected shift", i, value, score);
        } else if i % 100 == 0 {
            println!("index {:4}  value {:8.2}  score {:.3}", i, value, score);
        }
    }
    println!("peak score {:.3} at index {}", peak_score, peak_index);
}
