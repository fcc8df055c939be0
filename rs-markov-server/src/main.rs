use std::fs;
use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, web};
use clap::Parser;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use rs_markov_core::MarkovError;
use rs_markov_core::io::load_model;
use rs_markov_core::model::compiled::CompiledModel;
use rs_markov_core::model::generation_config::GenerationConfig;
use rs_markov_core::model::generator::{Generator, OverlapFilter};
use rs_markov_core::model::token::Token;
use rs_markov_core::model::tokenizer::Tokenizer;

const DEFAULT_TRIES: usize = 50;

/// Serves generated text from one persisted model.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Model file produced by rs-markov-train
	model: PathBuf,

	#[arg(long, default_value = "127.0.0.1")]
	host: String,

	#[arg(long, default_value_t = 5000)]
	port: u16,

	/// JSON file with generation settings (partial settings allowed)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Reply used when every generation tier fails
	#[arg(long, default_value = "...")]
	fallback: String,
}

/// Read-only state shared by every worker.
///
/// The compiled model is immutable, so no lock is needed.
struct SharedData {
	model: CompiledModel,
	tokenizer: Tokenizer,
	config: GenerationConfig,
	fallback: String,
}

impl SharedData {
	fn generator(&self) -> Result<Generator<'_>, MarkovError> {
		Generator::with_config(&self.model, self.tokenizer.clone(), self.config.clone())
	}
}

/// Query parameters for the `/v1/reply` endpoint
#[derive(Deserialize)]
struct ReplyParams {
	/// Recent context; its last words seed the reply.
	context: Option<String>,
	max_chars: Option<usize>,
	tries: Option<usize>,
}

#[derive(Deserialize)]
struct FreeParams {
	tries: Option<usize>,
}

#[derive(Deserialize)]
struct SeededParams {
	seed: String,
	tries: Option<usize>,
}

#[derive(Deserialize)]
struct ShortParams {
	max_chars: usize,
	tries: Option<usize>,
}

/// Which tier of the fallback chain produced a reply.
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
enum Tier {
	Seeded { words: usize },
	Free,
	Fallback,
}

#[derive(Serialize)]
struct Reply {
	text: String,
	tier: Tier,
}

#[derive(Serialize)]
struct ModelInfo {
	state_size: usize,
	states: usize,
	overlap_filter: String,
}

/// Maps engine errors to HTTP statuses.
fn error_response(err: &MarkovError) -> HttpResponse {
	match err {
		MarkovError::SeedNotFound { .. } => HttpResponse::NotFound().body(err.to_string()),
		MarkovError::InvalidSeed(_) | MarkovError::InvalidConfig(_) => HttpResponse::BadRequest().body(err.to_string()),
		MarkovError::NoViableSentence { .. } => HttpResponse::UnprocessableEntity().body(err.to_string()),
		_ => HttpResponse::InternalServerError().body(err.to_string()),
	}
}

/// Seeded-then-unseeded-then-static reply.
///
/// Tries the last two words of `context` as a seed, then the last word,
/// then free generation, then the configured fallback text. A reply longer
/// than `max_chars` counts as a miss for its tier.
fn reply(data: &SharedData, params: &ReplyParams) -> Result<Reply, MarkovError> {
	let generator = data.generator()?;
	let tries = params.tries.unwrap_or(DEFAULT_TRIES);
	let fits = |text: &str| params.max_chars.is_none_or(|max| text.chars().count() <= max);
	let mut rng = rand::rng();

	let context: Vec<Token> = params
		.context
		.as_deref()
		.map(|c| data.tokenizer.tokenize(c))
		.unwrap_or_default()
		.into_iter()
		.filter(|t| !data.tokenizer.is_terminator(t))
		.collect();

	let widest = context.len().min(2).min(data.model.state_size());
	for words in (1..=widest).rev() {
		let seed = &context[context.len() - words..];
		match generator.generate_with_seed(&mut rng, seed, tries) {
			Ok(tokens) => {
				let text = generator.render(&tokens);
				if fits(&text) {
					return Ok(Reply { text, tier: Tier::Seeded { words } });
				}
			}
			Err(MarkovError::SeedNotFound { .. } | MarkovError::NoViableSentence { .. }) => (),
			Err(e) => return Err(e),
		}
	}

	let free = match params.max_chars {
		Some(max) => generator.generate_short(&mut rng, max, tries),
		None => generator.generate(&mut rng, tries).map(|tokens| generator.render(&tokens)),
	};
	match free {
		Ok(text) => Ok(Reply { text, tier: Tier::Free }),
		Err(MarkovError::NoViableSentence { .. }) => Ok(Reply { text: data.fallback.clone(), tier: Tier::Fallback }),
		Err(e) => Err(e),
	}
}

/// HTTP GET endpoint `/v1/reply`
///
/// Runs the whole fallback chain, always answers with some text.
#[get("/v1/reply")]
async fn get_reply(data: web::Data<SharedData>, query: web::Query<ReplyParams>) -> impl Responder {
	match reply(&data, &query) {
		Ok(reply) => HttpResponse::Ok().json(reply),
		Err(e) => error_response(&e),
	}
}

/// HTTP GET endpoint `/v1/generate`
#[get("/v1/generate")]
async fn get_generated(data: web::Data<SharedData>, query: web::Query<FreeParams>) -> impl Responder {
	let generator = match data.generator() {
		Ok(g) => g,
		Err(e) => return error_response(&e),
	};
	match generator.generate(&mut rand::rng(), query.tries.unwrap_or(DEFAULT_TRIES)) {
		Ok(tokens) => HttpResponse::Ok().body(generator.render(&tokens)),
		Err(e) => error_response(&e),
	}
}

/// HTTP GET endpoint `/v1/generate/seeded`
///
/// No fallback: an unknown seed is a 404.
#[get("/v1/generate/seeded")]
async fn get_seeded(data: web::Data<SharedData>, query: web::Query<SeededParams>) -> impl Responder {
	let generator = match data.generator() {
		Ok(g) => g,
		Err(e) => return error_response(&e),
	};
	let seed = data.tokenizer.tokenize(&query.seed);
	match generator.generate_with_seed(&mut rand::rng(), &seed, query.tries.unwrap_or(DEFAULT_TRIES)) {
		Ok(tokens) => HttpResponse::Ok().body(generator.render(&tokens)),
		Err(e) => error_response(&e),
	}
}

/// HTTP GET endpoint `/v1/generate/short`
#[get("/v1/generate/short")]
async fn get_short(data: web::Data<SharedData>, query: web::Query<ShortParams>) -> impl Responder {
	let generator = match data.generator() {
		Ok(g) => g,
		Err(e) => return error_response(&e),
	};
	match generator.generate_short(&mut rand::rng(), query.max_chars, query.tries.unwrap_or(DEFAULT_TRIES)) {
		Ok(text) => HttpResponse::Ok().body(text),
		Err(e) => error_response(&e),
	}
}

#[get("/v1/model")]
async fn get_model(data: web::Data<SharedData>) -> impl Responder {
	let overlap_filter = match data.generator() {
		Ok(g) => format!("{:?}", g.overlap_filter()),
		Err(e) => return error_response(&e),
	};
	HttpResponse::Ok().json(ModelInfo {
		state_size: data.model.state_size(),
		states: data.model.state_count(),
		overlap_filter,
	})
}

fn load_config(path: Option<&PathBuf>) -> Result<GenerationConfig, Box<dyn std::error::Error>> {
	let Some(path) = path else {
		return Ok(GenerationConfig::default());
	};
	let config: GenerationConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
	config.validate()?;
	Ok(config)
}

/// Main entry point for the server.
///
/// Loads the model once, compiles it, and shares it read-only between all
/// Actix-web workers.
#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let config = load_config(args.config.as_ref())?;
	let model = load_model(&args.model)?.compile();
	info!("Model compiled: {} states", model.state_count());

	let shared_data = SharedData { model, tokenizer: Tokenizer::default(), config, fallback: args.fallback };
	if shared_data.generator()?.overlap_filter() != OverlapFilter::Active {
		warn!("Overlap check disabled: generated text may repeat the corpus verbatim");
	}
	let shared_data = web::Data::new(shared_data);

	info!("Listening on {}:{}", args.host, args.port);
	HttpServer::new(move || {
		App::new()
			.wrap(Cors::default().allow_any_origin().allowed_methods(vec!["GET"]))
			.app_data(shared_data.clone())
			.service(get_reply)
			.service(get_generated)
			.service(get_seeded)
			.service(get_short)
			.service(get_model)
	})
	.bind((args.host.as_str(), args.port))?
	.run()
	.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use actix_web::http::StatusCode;
	use actix_web::test;
	use rs_markov_core::model::chain::build;

	fn shared(lines: &[&str]) -> SharedData {
		let tokenizer = Tokenizer::default();
		let model = build(lines.iter().map(|l| tokenizer.tokenize(l)), 2).unwrap().compile();
		SharedData { model, tokenizer, config: GenerationConfig::default(), fallback: "...".to_owned() }
	}

	fn params(context: Option<&str>, max_chars: Option<usize>) -> ReplyParams {
		ReplyParams { context: context.map(str::to_owned), max_chars, tries: Some(20) }
	}

	#[::core::prelude::v1::test]
	fn test_reply_tiers() {
		let data = shared(&["the cat sat on the mat", "dogs bark loudly"]);

		let r = reply(&data, &params(Some("look, the cat"), None)).unwrap();
		assert_eq!(r.tier, Tier::Seeded { words: 2 });
		assert_eq!(r.text, "the cat sat on the mat");

		let r = reply(&data, &params(Some("my cat"), None)).unwrap();
		assert_eq!(r.tier, Tier::Seeded { words: 1 });
		assert_eq!(r.text, "cat sat on the mat");

		let r = reply(&data, &params(Some("unknown words"), None)).unwrap();
		assert_eq!(r.tier, Tier::Free);

		let r = reply(&data, &params(None, Some(1))).unwrap();
		assert_eq!(r.tier, Tier::Fallback);
		assert_eq!(r.text, "...");
	}

	#[actix_web::test]
	async fn test_endpoints() {
		let data = web::Data::new(shared(&["the cat sat", "the cat ran"]));
		let app = test::init_service(
			App::new()
				.app_data(data)
				.service(get_reply)
				.service(get_generated)
				.service(get_seeded)
				.service(get_short)
				.service(get_model),
		)
		.await;

		let req = test::TestRequest::get().uri("/v1/generate").to_request();
		let body = test::call_and_read_body(&app, req).await;
		assert!(body == "the cat sat" || body == "the cat ran");

		let req = test::TestRequest::get().uri("/v1/generate/seeded?seed=zebra").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

		let req = test::TestRequest::get().uri("/v1/generate/seeded?seed=cat").to_request();
		let body = test::call_and_read_body(&app, req).await;
		assert!(body.starts_with(b"cat "));

		let req = test::TestRequest::get().uri("/v1/generate/short?max_chars=3").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);

		let req = test::TestRequest::get().uri("/v1/model").to_request();
		let info: serde_json::Value = test::call_and_read_body_json(&app, req).await;
		assert_eq!(info["state_size"], 2);
		assert_eq!(info["overlap_filter"], "DisabledNoRetainedSentences");
	}
}
