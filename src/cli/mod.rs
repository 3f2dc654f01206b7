// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod recognize;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Texant single-line OCR
#[derive(Parser, Debug)]
#[command(name = "texant-ocr")]
#[command(version)]
#[command(about = "Recognize single lines of text in images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recognize the text line in one or more images
    Recognize(recognize::RecognizeArgs),

    /// Load the model and vocabulary and report what was found
    Check(recognize::CheckArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Recognize(args) => recognize::recognize_images(args).await,
        Commands::Check(args) => recognize::check_model(args).await,
    }
}
