use rand::SeedableRng;
use rand::rngs::StdRng;
use rs_textgen_core::model::contract::StatsDetail;
use rs_textgen_core::{
	FinishReason, GenerationContext, LanguageModel, ModelError, ModelKind, SequenceSource, TrainOptions,
	TrainingInput, VariableMarkovModel,
};
use serde_json::json;

fn tokens(text: &str) -> Vec<String> {
	text.split_whitespace().map(str::to_owned).collect()
}

fn trained(corpus: &str, max_order: usize, min_count: usize) -> VariableMarkovModel {
	let mut model = VariableMarkovModel::new(max_order, min_count).unwrap();
	model.train(TrainingInput::from(&tokens(corpus)), &TrainOptions::default()).unwrap();
	model
}

const CORPUS: &str = "the cat sat on the mat . the dog sat on the log . the cat ran to the dog .";

#[test]
fn start_states_open_sentences() {
	let model = trained(CORPUS, 3, 1);
	assert_eq!(model.start_states().collect::<Vec<_>>(), vec!["the"]);
}

#[test]
fn longest_context_wins_when_frequent_enough() {
	let model = trained(CORPUS, 3, 2);
	// "sat on the" is seen twice, "ran to the" once
	assert_eq!(model.context_order(&tokens("sat on the")), Some(3));
	assert_eq!(model.context_order(&tokens("ran to the")), Some(1));
	assert_eq!(model.context_order(&tokens("zebra")), None);
}

#[test]
fn single_token_corpus_is_insufficient() {
	let mut model = VariableMarkovModel::new(2, 1).unwrap();
	let result = model.train(TrainingInput::from(&tokens("alone")), &TrainOptions::default());
	assert!(matches!(result, Err(ModelError::InsufficientData(_))));
}

#[test]
fn generation_stops_on_sentence_end() {
	let model = trained(CORPUS, 3, 1);
	let ctx = GenerationContext { max_tokens: 100, min_tokens: 2, ..GenerationContext::default() };
	for seed in 0..5 {
		let result = model.generate(&ctx, &mut StdRng::seed_from_u64(seed)).unwrap();
		assert_eq!(result.model, ModelKind::Vlmm);
		assert_eq!(result.tokens[0], "the");
		if result.finish_reason == FinishReason::Stop {
			assert_eq!(result.tokens.last().map(String::as_str), Some("."));
		}
	}
}

#[test]
fn temperature_zero_is_reproducible() {
	let model = trained(CORPUS, 3, 1);
	let ctx = GenerationContext {
		prompt: Some("the dog".to_owned()),
		temperature: 0.0,
		max_tokens: 6,
		min_tokens: 0,
		..GenerationContext::default()
	};
	let first = model.generate(&ctx, &mut SequenceSource::new(vec![0.1])).unwrap();
	let second = model.generate(&ctx, &mut SequenceSource::new(vec![0.9])).unwrap();
	assert_eq!(first.tokens, second.tokens);
	assert_eq!(first.tokens[0], "dog");
}

#[test]
fn stats_report_contexts_per_order() {
	let model = trained("a b c a b d", 3, 1);
	match model.stats().detail {
		StatsDetail::Vlmm { max_order, states_per_order, .. } => {
			assert_eq!(max_order, 3);
			assert_eq!(states_per_order, vec![3, 3, 3]);
		}
		other => panic!("unexpected stats {other:?}"),
	}
}

#[test]
fn json_round_trip_is_exact() {
	let model = trained(CORPUS, 3, 2);
	let json = model.to_json();
	assert_eq!(json["modelType"], "vlmm");
	assert_eq!(json["chains"].as_array().map(Vec::len), Some(3));
	assert_eq!(VariableMarkovModel::from_json(&json).unwrap(), model);
}

#[test]
fn invalid_data_is_rejected() {
	let valid = trained("a b a c", 2, 1).to_json();

	let mut data = valid.clone();
	data["maxOrder"] = json!(0);
	assert!(matches!(VariableMarkovModel::from_json(&data), Err(ModelError::InvalidModelData(_))));

	let mut data = valid.clone();
	data["chains"] = json!({});
	assert!(matches!(VariableMarkovModel::from_json(&data), Err(ModelError::InvalidModelData(_))));

	let mut data = valid;
	data["vocabulary"] = json!(null);
	assert!(matches!(VariableMarkovModel::from_json(&data), Err(ModelError::InvalidModelData(_))));
}
