/*
 Copyright (c) 2024 clone206

 This file is part of st2surround

 st2surround is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 st2surround is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with st2surround. If not, see <https://www.gnu.org/licenses/>.
*/

use core::fmt;
use std::process::{ExitCode, Termination};

use log::error;

mod audio_file;
mod channel_map;
mod chunker;
mod color_logger;
mod decoder;
mod input;
mod output;
mod position;
mod sample_queue;
mod soundfield;
mod upmix;

pub use audio_file::{AudioFile, AudioFileFormat, AudioSample};
pub use channel_map::{ChannelId, ChannelSetup};
pub use chunker::StreamChunker;
pub use color_logger::ColorLogger;
pub use decoder::SurroundDecoder;
pub use input::{InputContext, SampleFormat};
pub use output::OutputContext;
pub use sample_queue::SampleQueue;
pub use upmix::{UpmixContext, UpmixParams, UpmixStats};

#[derive(Debug)]
pub enum MyError {
    Message(String),
}

impl std::fmt::Display for MyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MyError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MyError {}

pub type MyResult<T> = Result<T, MyError>;

pub struct TermResult(pub MyResult<()>);

impl Termination for TermResult {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{}", err);
                ExitCode::FAILURE
            }
        }
    }
}

// Convert boxed dynamic errors into MyError
impl From<Box<dyn std::error::Error>> for MyError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<std::io::Error> for MyError {
    fn from(err: std::io::Error) -> Self {
        MyError::Message(err.to_string())
    }
}

impl From<&str> for MyError {
    fn from(msg: &str) -> Self {
        MyError::Message(msg.to_string())
    }
}

impl From<String> for MyError {
    fn from(msg: String) -> Self {
        MyError::Message(msg)
    }
}
