use std::fs;

use rs_textgen_core::io::{load_model, save_model};
use rs_textgen_core::{
	AnyModel, GenerationContext, LanguageModel, ModelError, ModelKind, TokenizeMethod, TokenizerOptions,
	TrainingOptions, TrainingSource, generate, generate_batch, load_or_train, train_model,
};

const CORPUS: &str = "The cat sat on the mat. The dog sat on the log. The cat saw the dog. \
	A bird flew over the house. The dog ran after the bird!";

fn options(model_type: ModelKind) -> TrainingOptions {
	TrainingOptions { model_type, num_states: 3, max_iterations: 20, seed: Some(1), ..TrainingOptions::default() }
}

fn seeded(seed: u64) -> GenerationContext {
	GenerationContext { seed: Some(seed), max_tokens: 15, min_tokens: 3, ..GenerationContext::default() }
}

#[test]
fn seeded_generation_is_reproducible() {
	for kind in [ModelKind::Markov, ModelKind::Hmm, ModelKind::Vlmm] {
		let model = train_model(TrainingSource::Text(CORPUS), &options(kind)).unwrap();
		let first = generate(&model, &seeded(7)).unwrap();
		let second = generate(&model, &seeded(7)).unwrap();
		assert_eq!(first, second, "{kind} is not reproducible");
		assert!(first.length <= 15);
		assert_eq!(first.model, kind);
	}
}

#[test]
fn batch_matches_individual_seeded_samples() {
	let model = train_model(TrainingSource::Text(CORPUS), &options(ModelKind::Markov)).unwrap();
	let results = generate_batch(&model, &seeded(100), 6);
	assert_eq!(results.len(), 6);
	for (i, result) in results.into_iter().enumerate() {
		let expected = generate(&model, &seeded(100 + i as u64)).unwrap();
		assert_eq!(result.unwrap(), expected);
	}
}

#[test]
fn batch_isolates_failing_samples() {
	let model = train_model(TrainingSource::Text(CORPUS), &options(ModelKind::Vlmm)).unwrap();
	let invalid = GenerationContext { temperature: f64::INFINITY, ..GenerationContext::default() };
	let results = generate_batch(&model, &invalid, 4);
	assert_eq!(results.len(), 4);
	assert!(results.iter().all(|r| matches!(r, Err(ModelError::InvalidInput(_)))));
}

#[test]
fn token_sources_train_without_tokenizing() {
	let flat: Vec<String> = "x y z x y w".split(' ').map(str::to_owned).collect();
	let model = train_model(TrainingSource::Tokens(&flat), &TrainingOptions { order: 1, ..TrainingOptions::default() })
		.unwrap();
	assert_eq!(model.as_markov().unwrap().state("x").unwrap().count("y"), 2);

	let grouped = vec![flat[..3].to_vec(), flat[3..].to_vec()];
	let model =
		train_model(TrainingSource::Sequences(&grouped), &TrainingOptions { order: 1, ..TrainingOptions::default() })
			.unwrap();
	assert!(model.as_markov().unwrap().state("z").is_none());
}

#[test]
fn sentence_tokenizer_trains_on_whole_sentences() {
	let options = TrainingOptions {
		order: 1,
		tokenizer: TokenizerOptions { method: TokenizeMethod::Sentence, ..TokenizerOptions::default() },
		..TrainingOptions::default()
	};
	let model = train_model(TrainingSource::Text("One. Two. One. Three."), &options).unwrap();
	let markov = model.as_markov().unwrap();
	assert_eq!(markov.state("one.").unwrap().total(), 2);
	assert!(markov.vocabulary().contains("three."));
}

#[test]
fn invalid_hyperparameters_are_rejected() {
	let zero_order = TrainingOptions { order: 0, ..TrainingOptions::default() };
	assert!(matches!(train_model(TrainingSource::Text(CORPUS), &zero_order), Err(ModelError::InvalidInput(_))));

	let zero_states = TrainingOptions { num_states: 0, ..options(ModelKind::Hmm) };
	assert!(matches!(train_model(TrainingSource::Text(CORPUS), &zero_states), Err(ModelError::InvalidInput(_))));
}

#[test]
fn models_persist_as_json_and_binary() {
	let dir = tempfile::tempdir().unwrap();

	for kind in [ModelKind::Markov, ModelKind::Hmm, ModelKind::Vlmm] {
		let model = train_model(TrainingSource::Text(CORPUS), &options(kind)).unwrap();
		for extension in ["json", "bin"] {
			let path = dir.path().join(format!("{kind}.{extension}"));
			save_model(&model, &path).unwrap();
			let restored = load_model(&path).unwrap();
			assert_eq!(restored.model_type(), kind);
			assert_eq!(restored.to_data(), model.to_data(), "{kind} via .{extension}");
			assert_eq!(generate(&restored, &seeded(3)).unwrap(), generate(&model, &seeded(3)).unwrap());
		}
	}

	let model = train_model(TrainingSource::Text(CORPUS), &options(ModelKind::Markov)).unwrap();
	assert!(matches!(save_model(&model, dir.path().join("model.dat")), Err(ModelError::InvalidInput(_))));
}

#[test]
fn json_file_holds_the_plain_data_format() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("markov.json");
	let model = train_model(TrainingSource::Text(CORPUS), &options(ModelKind::Markov)).unwrap();
	save_model(&model, &path).unwrap();

	let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
	assert_eq!(value["modelType"], "markov");
	assert!(value["chain"].is_object());
	assert!(value["vocabulary"].is_array());
	assert!(value["startStates"].is_array());
	assert!(AnyModel::from_json(&value).is_ok());
}

#[test]
fn corrupted_files_are_reported() {
	let dir = tempfile::tempdir().unwrap();

	let json = dir.path().join("broken.json");
	fs::write(&json, r#"{"modelType":"markov","order":0}"#).unwrap();
	assert!(matches!(load_model(&json), Err(ModelError::InvalidModelData(_))));

	let bin = dir.path().join("broken.bin");
	fs::write(&bin, [0xff, 0xff, 0xff]).unwrap();
	assert!(matches!(load_model(&bin), Err(ModelError::Binary(_))));

	assert!(matches!(load_model(dir.path().join("missing.json")), Err(ModelError::Io(_))));
}

#[test]
fn load_or_train_caches_next_to_the_corpus() {
	let dir = tempfile::tempdir().unwrap();
	let corpus = dir.path().join("animals.txt");
	fs::write(&corpus, CORPUS).unwrap();

	let options = options(ModelKind::Vlmm);
	let trained = load_or_train(&corpus, &options).unwrap();
	let cache = dir.path().join("animals.vlmm.bin");
	assert!(cache.exists());

	// The second call must come from the cache, not the (now different) corpus
	fs::write(&corpus, "completely different words here").unwrap();
	let cached = load_or_train(&corpus, &options).unwrap();
	assert_eq!(cached.to_data(), trained.to_data());

	// Another model type gets its own cache
	let markov = load_or_train(&corpus, &TrainingOptions { model_type: ModelKind::Markov, ..options }).unwrap();
	assert_eq!(markov.model_type(), ModelKind::Markov);
	assert!(dir.path().join("animals.markov.bin").exists());
}

#[test]
fn load_or_train_rebuilds_when_options_change() {
	let dir = tempfile::tempdir().unwrap();
	let corpus = dir.path().join("animals.txt");
	fs::write(&corpus, CORPUS).unwrap();

	let order_two = options(ModelKind::Markov);
	let first = load_or_train(&corpus, &order_two).unwrap();
	assert_eq!(first.as_markov().unwrap().order(), 2);

	let order_three = TrainingOptions { order: 3, ..order_two.clone() };
	let second = load_or_train(&corpus, &order_three).unwrap();
	assert_eq!(second.as_markov().unwrap().order(), 3);

	// Tokenizer options are not stored in the model itself but still count
	let no_punctuation = TrainingOptions {
		tokenizer: TokenizerOptions { preserve_punctuation: false, ..TokenizerOptions::default() },
		..order_three.clone()
	};
	let third = load_or_train(&corpus, &no_punctuation).unwrap();
	assert!(second.as_markov().unwrap().vocabulary().contains("."));
	assert!(!third.as_markov().unwrap().vocabulary().contains("."));

	// The cache now matches the last options and is reused as is
	fs::write(&corpus, "completely different words here").unwrap();
	let cached = load_or_train(&corpus, &no_punctuation).unwrap();
	assert_eq!(cached.to_data(), third.to_data());
}
