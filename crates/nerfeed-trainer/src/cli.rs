//! Command-line interface of the `nerfeed` binary.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use nerfeed_core::{EmbeddingSource, KvStore, Pipeline, PipelineConfig, TagScheme};
use nerfeed_vectors::VectorDirectory;
use tracing::info;

use crate::model::CrfTagger;
use crate::trainer::{MODEL_FILE, PREDICTIONS_FILE, TrainConfig, Trainer};

#[derive(Debug, Parser)]
#[command(name = "nerfeed")]
#[command(about = "Prepare tagged corpora for BiLSTM-CRF named-entity training")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON pipeline configuration; the flags below override its fields
    #[arg(short, long, env = "NERFEED_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory of tab-separated corpus files
    #[arg(long, env = "NERFEED_CORPUS_DIR", global = true)]
    pub corpus_dir: Option<PathBuf>,

    /// Directory for the metadata and feed stores
    #[arg(long, env = "NERFEED_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding pretrained vector files
    #[arg(long, env = "NERFEED_EMBEDDINGS_DIR", global = true)]
    pub embeddings_dir: Option<PathBuf>,

    /// Share of sentences in the training split
    #[arg(long, env = "NERFEED_TRAIN_RATIO", global = true)]
    pub train_ratio: Option<f64>,

    /// Character width of the character encoder
    #[arg(long, env = "NERFEED_MAX_WORD_LEN", global = true)]
    pub max_word_len: Option<usize>,

    /// Random seed for splitting, shuffling and OOV rows
    #[arg(long, env = "NERFEED_SEED", global = true)]
    pub seed: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read the corpus and write the metadata store
    Init,
    /// Build the feed store for one embedding source and tag scheme
    Preprocess {
        /// bio-word2vec, bio-word2vec-old, word2vec, fasttext or glove
        #[arg(short, long, env = "NERFEED_EMBEDDINGS")]
        embeddings: EmbeddingSource,
        /// BIO or BIOES
        #[arg(short, long, env = "NERFEED_TAGGING", default_value = "BIOES")]
        tagging: TagScheme,
    },
    /// Train the reference tagger on a preprocessed feed and tag the dev split
    Train {
        #[arg(short, long, env = "NERFEED_EMBEDDINGS")]
        embeddings: EmbeddingSource,
        #[arg(short, long, env = "NERFEED_TAGGING", default_value = "BIOES")]
        tagging: TagScheme,
        #[arg(long, default_value_t = 10)]
        epochs: usize,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long, default_value_t = 0.01)]
        learning_rate: f32,
        /// Inverse-time decay factor applied per epoch
        #[arg(long, default_value_t = 0.05)]
        lr_decay: f32,
        /// Directory for the saved model and dev predictions
        #[arg(short, long, default_value = "models")]
        output: PathBuf,
    },
    /// Print the keys and sizes of the persisted stores
    Inspect {
        #[arg(short, long)]
        embeddings: Option<EmbeddingSource>,
        #[arg(short, long)]
        tagging: Option<TagScheme>,
    },
}

impl Cli {
    /// Defaults, then the `--config` file, then individual flags.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::new(),
        };
        if let Some(dir) = &self.corpus_dir {
            config = config.with_corpus_dir(dir);
        }
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(dir) = &self.embeddings_dir {
            config = config.with_embeddings_dir(dir);
        }
        if let Some(ratio) = self.train_ratio {
            config = config.with_train_ratio(ratio);
        }
        if let Some(width) = self.max_word_len {
            config = config.with_max_word_len(width);
        }
        if self.seed.is_some() {
            config = config.with_seed(self.seed);
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.pipeline_config()?;
    let pipeline = Pipeline::new(config.clone())?;

    match cli.command {
        Commands::Init => {
            let metadata = pipeline.init_metadata()?;
            info!(
                sentences = metadata.corpus.len(),
                vocabulary = metadata.vocab.len(),
                train = metadata.split.train.len(),
                dev = metadata.split.dev.len(),
                "metadata ready"
            );
        }
        Commands::Preprocess {
            embeddings,
            tagging,
        } => {
            let provider = VectorDirectory::new(&config.embeddings_dir);
            let feed = pipeline
                .preprocess(&provider, embeddings, tagging)
                .with_context(|| format!("preprocessing {embeddings} {tagging} failed"))?;
            info!(
                train = feed.train_sentences.len(),
                dev = feed.dev_sentences.len(),
                tags = feed.labels_template.len(),
                oov = feed.lookup_table.oov_count(),
                "feed ready"
            );
        }
        Commands::Train {
            embeddings,
            tagging,
            epochs,
            batch_size,
            learning_rate,
            lr_decay,
            output,
        } => {
            let loaded = pipeline.load_feed(embeddings, tagging)?;
            let feed = &loaded.feed;
            let model = CrfTagger::new(&feed.lookup_table, feed.labels_template.len(), &Device::Cpu)?;
            let train_config = TrainConfig::new()
                .with_epochs(epochs)
                .with_batch_size(batch_size)
                .with_learning_rate(learning_rate)
                .with_lr_decay(lr_decay)
                .with_seed(config.seed);
            let mut trainer = Trainer::new(model, train_config)?;
            trainer.train(feed)?;

            std::fs::create_dir_all(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            trainer.model().save(&output.join(MODEL_FILE))?;

            let predictions = output.join(PREDICTIONS_FILE);
            let file = File::create(&predictions)
                .with_context(|| format!("failed to create {}", predictions.display()))?;
            let mut out = BufWriter::new(file);
            trainer.evaluate(feed, &loaded.metadata.vocab, &mut out)?;
            info!(path = %predictions.display(), "dev predictions written");
        }
        Commands::Inspect {
            embeddings,
            tagging,
        } => {
            let mut paths = vec![config.metadata_path()];
            if let (Some(source), Some(scheme)) = (embeddings, tagging) {
                paths.push(config.feed_path(source.key(), scheme.as_str()));
            }
            for path in paths {
                if !path.exists() {
                    println!("{}: missing", path.display());
                    continue;
                }
                let store = KvStore::open(&path)?;
                println!("{}:", path.display());
                for (key, size) in store.entries_summary()? {
                    println!("  {key:<24} {size:>12} bytes");
                }
            }
        }
    }
    Ok(())
}
