//! Training-loop tests: metric bookkeeping, argument validation, update
//! pass scoping, learning on a separable problem and cooperative
//! interruption.

use multilayer_perceptron::data::Dataset;
use multilayer_perceptron::error::NetworkError;
use multilayer_perceptron::layers::{
    ConvolutionalLayer, DenseLayer, FlattenLayer, InputLayer, MaxPoolingLayer, OutputLayer,
};
use multilayer_perceptron::network::Network;
use multilayer_perceptron::utils::Activation;

/// Four linearly separable samples over two classes.
fn separable_dataset() -> Dataset {
    let inputs = vec![
        1.0, 0.0, //
        0.9, 0.1, //
        0.0, 1.0, //
        0.1, 0.9,
    ];
    let targets = vec![
        1.0, 0.0, //
        1.0, 0.0, //
        0.0, 1.0, //
        0.0, 1.0,
    ];
    Dataset::new(inputs, 2, targets, 2).unwrap()
}

fn two_layer_network(seed: u64) -> Network {
    let mut network = Network::with_seed(seed);
    network.add(InputLayer::new(vec![2])).unwrap();
    network.add(OutputLayer::new(2)).unwrap();
    network.build().unwrap();
    network
}

// ============================================================================
// Metric bookkeeping
// ============================================================================

mod metrics {
    use super::*;

    #[test]
    fn test_single_epoch_full_batch_records_one_step() {
        let train = separable_dataset();
        let valid = separable_dataset();
        let mut network = two_layer_network(42);

        network.fit(&train, 1, 0.1, train.len(), Some(&valid)).unwrap();

        assert_eq!(network.train_loss_per_iter().len(), 1);
        assert_eq!(network.train_accu_per_iter().len(), 1);
        assert_eq!(network.valid_loss_per_epoch().len(), 1);
        assert_eq!(network.valid_accu_per_epoch().len(), 1);
    }

    #[test]
    fn test_step_metrics_follow_batch_count() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);

        // 4 samples, batch 3: ceil(4/3) = 2 steps per epoch, 3 epochs.
        network.fit(&train, 3, 0.1, 3, None).unwrap();

        assert_eq!(network.train_loss_per_iter().len(), 6);
        assert_eq!(network.train_accu_per_iter().len(), 6);
        assert!(network.valid_loss_per_epoch().is_empty());
    }

    #[test]
    fn test_validation_metrics_are_per_epoch() {
        let train = separable_dataset();
        let valid = separable_dataset();
        let mut network = two_layer_network(42);

        network.fit(&train, 5, 0.1, 2, Some(&valid)).unwrap();

        assert_eq!(network.train_loss_per_iter().len(), 10);
        assert_eq!(network.valid_loss_per_epoch().len(), 5);
        assert_eq!(network.valid_accu_per_epoch().len(), 5);
    }

    #[test]
    fn test_metric_history_accumulates_across_fit_calls() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);

        network.fit(&train, 1, 0.1, 4, None).unwrap();
        network.fit(&train, 1, 0.1, 4, None).unwrap();

        // History is only reset by constructing a new network.
        assert_eq!(network.train_loss_per_iter().len(), 2);
    }
}

// ============================================================================
// Argument validation
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_zero_epochs_rejected() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        let err = network.fit(&train, 0, 0.1, 2, None).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidArgument(_)));
    }

    #[test]
    fn test_non_positive_learning_rate_rejected() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        assert!(network.fit(&train, 1, 0.0, 2, None).is_err());
        assert!(network.fit(&train, 1, -0.5, 2, None).is_err());
        assert!(network.fit(&train, 1, f32::NAN, 2, None).is_err());
    }

    #[test]
    fn test_batch_size_bounds_enforced() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        assert!(network.fit(&train, 1, 0.1, 0, None).is_err());
        assert!(network.fit(&train, 1, 0.1, train.len() + 1, None).is_err());
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let empty = Dataset::new(vec![], 2, vec![], 2).unwrap();
        let mut network = two_layer_network(42);
        let err = network.fit(&empty, 1, 0.1, 1, None).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidArgument(_)));
    }

    #[test]
    fn test_dataset_stride_must_match_endpoints() {
        // 3 values per input sample against an input layer of width 2.
        let bad = Dataset::new(vec![0.0; 6], 3, vec![0.0; 4], 2).unwrap();
        let mut network = two_layer_network(42);
        assert!(network.fit(&bad, 1, 0.1, 1, None).is_err());

        // Target width 3 against an output layer of width 2.
        let bad = Dataset::new(vec![0.0; 4], 2, vec![0.0; 6], 3).unwrap();
        assert!(network.fit(&bad, 1, 0.1, 1, None).is_err());
    }

    #[test]
    fn test_failed_fit_leaves_no_metrics() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        let _ = network.fit(&train, 0, 0.1, 2, None);
        assert!(network.train_loss_per_iter().is_empty());
    }
}

// ============================================================================
// Update pass scoping and learning
// ============================================================================

mod learning {
    use super::*;

    #[test]
    fn test_loss_decreases_on_separable_problem() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);

        network.fit(&train, 200, 1.0, train.len(), None).unwrap();

        let history = network.train_loss_per_iter();
        assert!(history.last().unwrap() < history.first().unwrap());
        assert_eq!(*network.train_accu_per_iter().last().unwrap(), 1.0);
    }

    #[test]
    fn test_structural_layers_hold_no_parameters_through_training() {
        let mut network = Network::with_seed(42);
        network.add(InputLayer::new(vec![1, 4, 4])).unwrap();
        network
            .add(ConvolutionalLayer::new(2, 3, 1, 1, Activation::Relu))
            .unwrap();
        network.add(MaxPoolingLayer::new(2)).unwrap();
        network.add(FlattenLayer::new()).unwrap();
        network.add(OutputLayer::new(2)).unwrap();
        network.build().unwrap();

        // conv (2*1*3*3+2) + output (8*2+2); pool and flatten contribute 0.
        let params = network.parameter_count();
        assert_eq!(params, 20 + 18);

        let inputs: Vec<f32> = (0..32).map(|i| i as f32 / 32.0).collect();
        let targets = vec![1.0, 0.0, 0.0, 1.0];
        let train = Dataset::new(inputs, 16, targets, 2).unwrap();
        network.fit(&train, 5, 0.1, 2, None).unwrap();

        // The update pass never grows or shrinks any layer's state.
        assert_eq!(network.parameter_count(), params);
    }

    #[test]
    fn test_weights_stable_outside_fit() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        network.fit(&train, 10, 0.5, 4, None).unwrap();

        let input = [0.7f32, 0.3];
        let before = network.predict(&input).unwrap();
        network.test(&input, &[1.0, 0.0]).unwrap();
        let after = network.predict(&input).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_shuffled_training_still_learns() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);
        network.set_shuffle(true);
        network.fit(&train, 200, 1.0, 2, None).unwrap();
        assert_eq!(*network.train_accu_per_iter().last().unwrap(), 1.0);
    }
}

// ============================================================================
// Cooperative interruption
// ============================================================================

mod interruption {
    use super::*;

    #[test]
    fn test_raised_stop_flag_ends_fit_cleanly() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);

        let stop = network.stop_handle();
        stop.stop();

        // No batch runs, no error, no metric corruption.
        network.fit(&train, 100, 0.1, 2, None).unwrap();
        assert!(network.train_loss_per_iter().is_empty());
        assert!(network.built());

        // The network stays usable afterwards.
        let probs = network.predict(&[0.5, 0.5]).unwrap();
        assert_eq!(probs.len(), 2);
    }

    #[test]
    fn test_training_resumes_after_reset() {
        let train = separable_dataset();
        let mut network = two_layer_network(42);

        let stop = network.stop_handle();
        stop.stop();
        network.fit(&train, 10, 0.1, 4, None).unwrap();
        assert!(network.train_loss_per_iter().is_empty());

        stop.reset();
        network.fit(&train, 10, 0.1, 4, None).unwrap();
        assert_eq!(network.train_loss_per_iter().len(), 10);
    }
}
