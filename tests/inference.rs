mod common;

use burn::{
    backend::ndarray::NdArrayDevice,
    tensor::{Int, Tensor},
};
use pretty_assertions::assert_eq;
use topic_classifier::{
    backend::{graph_device, GraphBackend},
    pipelines::text_classification::{
        artifacts::FineTunedModel,
        export::{export, GraphManifest, WeightPrecision},
        graph::{self, GraphError, GraphSession},
        inference::{compare, load_native, Prediction},
    },
};

use common::B;

fn assert_normalized(prediction: &Prediction) {
    assert_eq!(prediction.probs.len(), common::LABELS.len());

    let sum: f32 = prediction.probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4, "probabilities sum to {}", sum);

    let max = prediction.probs.iter().cloned().fold(f32::MIN, f32::max);
    assert_eq!(prediction.probs[prediction.pred], max);
}

#[test]
fn graph_agrees_with_the_native_model() {
    let dir = common::scratch("agreement");
    let model = common::random_model(dir.join("hf"));
    let graph_path = dir.join("model.graph");

    let manifest = export(&model, &graph_path, WeightPrecision::Full).unwrap();
    assert_eq!(manifest.classifier.num_labels(), 4);
    assert_eq!(manifest.max_length, common::MAX_LENGTH);
    assert!(dir.join("model.mpk").is_file());

    let native = load_native::<B>(&model, &NdArrayDevice::Cpu).unwrap();
    let exported =
        graph::load_predictor::<GraphBackend>(&graph_path, model.dir(), &graph_device()).unwrap();

    let texts = common::fixture_texts();
    let agreement = compare(&native, &exported, &texts).unwrap();

    assert_eq!(agreement.texts, texts.len());
    assert!(agreement.within(1e-3), "{:?}", agreement);

    for prediction in exported.predict_batch(texts).unwrap() {
        assert_normalized(&prediction);
    }

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn single_predictions_match_batched_ones() {
    let dir = common::scratch("single");
    let model = common::random_model(dir.join("hf"));
    let native = load_native::<B>(&model, &NdArrayDevice::Cpu).unwrap();

    let text = "the team won the match";
    let single = native.predict(text).unwrap();
    let batched = native
        .predict_batch(vec![text.to_string(), "a".to_string()])
        .unwrap();

    assert_normalized(&single);
    assert_eq!(single.pred, batched[0].pred);
    for (a, b) in single.probs.iter().zip(&batched[0].probs) {
        assert!((a - b).abs() < 1e-5);
    }
    assert!(native.predict_batch(Vec::new()).unwrap().is_empty());

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn half_precision_graphs_pass_their_own_probe() {
    let dir = common::scratch("half");
    let model = common::random_model(dir.join("hf"));
    let graph_path = dir.join("model.graph");

    let manifest = export(&model, &graph_path, WeightPrecision::Half).unwrap();
    let reloaded = GraphManifest::load(&graph_path).unwrap();

    assert_eq!(manifest.precision, WeightPrecision::Half);
    assert_eq!(reloaded.probe, manifest.probe);

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn rejects_a_tokenizer_with_another_vocabulary() {
    let dir = common::scratch("vocab");
    let model = common::random_model(dir.join("hf"));
    let graph_path = dir.join("model.graph");
    export(&model, &graph_path, WeightPrecision::Full).unwrap();

    let other = common::word_tokenizer(&["only", "three", "words"]);
    let result = GraphSession::<GraphBackend>::load(&graph_path, &other, &graph_device());

    assert!(matches!(
        result,
        Err(GraphError::VocabularyMismatch {
            expected: 28,
            found: 7
        })
    ));

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn rejects_mismatched_input_shapes() {
    let dir = common::scratch("shapes");
    let model = common::random_model(dir.join("hf"));
    let graph_path = dir.join("model.graph");
    export(&model, &graph_path, WeightPrecision::Full).unwrap();

    let session =
        GraphSession::<GraphBackend>::load(&graph_path, &common::news_tokenizer(), &graph_device())
            .unwrap();

    let input_ids = Tensor::<GraphBackend, 2, Int>::ones([2, 5], &graph_device());
    let attention_mask = Tensor::<GraphBackend, 2, Int>::ones([2, 4], &graph_device());
    let too_long = Tensor::<GraphBackend, 2, Int>::ones([1, common::MAX_LENGTH + 1], &graph_device());

    assert!(matches!(
        session.run(input_ids, attention_mask),
        Err(GraphError::Shape(_))
    ));
    assert!(matches!(
        session.run(too_long.clone(), too_long),
        Err(GraphError::Shape(_))
    ));

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn export_requires_a_complete_model_directory() {
    let dir = common::scratch("incomplete");
    let model = common::random_model(dir.join("hf"));
    std::fs::remove_file(model.tokenizer_path()).unwrap();

    assert!(FineTunedModel::open(model.dir()).is_err());

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn rejects_unknown_format_versions() {
    let dir = common::scratch("version");
    let model = common::random_model(dir.join("hf"));
    let graph_path = dir.join("model.graph");
    let mut manifest = export(&model, &graph_path, WeightPrecision::Full).unwrap();

    manifest.format_version += 1;
    manifest.save(&graph_path).unwrap();

    assert!(matches!(
        GraphManifest::load(&graph_path),
        Err(GraphError::UnsupportedVersion(2))
    ));

    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn refuses_a_graph_path_shared_with_the_weights() {
    let dir = common::scratch("mpk-output");
    let model = common::random_model(dir.join("hf"));
    let output = dir.join("model.mpk");

    let result = export(&model, &output, WeightPrecision::Full);

    assert!(result.is_err());
    assert!(!output.exists());

    std::fs::remove_dir_all(dir).unwrap();
}
