//! XOR learned by a tiny chain: input(2) -> dense(8) -> output(2).
//!
//! Run with: cargo run --example xor

use multilayer_perceptron::data::Dataset;
use multilayer_perceptron::layers::{DenseLayer, InputLayer, OutputLayer};
use multilayer_perceptron::network::Network;
use multilayer_perceptron::utils::Activation;

const LEARNING_RATE: f32 = 0.5;
const EPOCHS: usize = 2000;

fn main() {
    let inputs = vec![
        0.0, 0.0, //
        0.0, 1.0, //
        1.0, 0.0, //
        1.0, 1.0,
    ];
    // One-hot classes: index 1 means "XOR is true".
    let targets = vec![
        1.0, 0.0, //
        0.0, 1.0, //
        0.0, 1.0, //
        1.0, 0.0,
    ];
    let train = Dataset::new(inputs.clone(), 2, targets, 2).expect("valid dataset");

    let mut network = Network::with_seed(42);
    network.add(InputLayer::new(vec![2])).expect("add input");
    network
        .add(DenseLayer::new(8, Activation::Sigmoid))
        .expect("add hidden");
    network.add(OutputLayer::new(2)).expect("add output");
    network.build().expect("build network");

    println!("Training XOR ({} parameters)...", network.parameter_count());
    network
        .fit(&train, EPOCHS, LEARNING_RATE, train.len(), None)
        .expect("training failed");

    for sample in inputs.chunks(2) {
        let probs = network.predict(sample).expect("predict");
        let xor = if probs[1] > probs[0] { 1 } else { 0 };
        println!(
            "{:.0} XOR {:.0} = {}  (p = {:.3})",
            sample[0],
            sample[1],
            xor,
            probs[1].max(probs[0])
        );
    }
}
