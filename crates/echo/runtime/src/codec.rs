// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Prost codec for request streams that may end in an error
//!
//! tonic wraps every client request item in `Ok`, so a request stream can only
//! end cleanly, which the server reads as a half-close. With this codec the
//! request items are `Result`s: encoding an `Err` fails the request body and
//! the transport resets the stream instead.

use prost::Message;
use tonic::Status;
use tonic::codec::{Codec, EncodeBuf, Encoder, ProstCodec};

#[derive(Debug, Clone)]
pub struct AbortableCodec<T, U> {
    inner: ProstCodec<T, U>,
}

impl<T, U> Default for AbortableCodec<T, U> {
    fn default() -> Self {
        Self { inner: ProstCodec::default() }
    }
}

impl<T, U> Codec for AbortableCodec<T, U>
where
    T: Message + Send + 'static,
    U: Message + Default + Send + 'static,
{
    type Encode = Result<T, Status>;
    type Decode = U;

    type Encoder = AbortableEncoder<<ProstCodec<T, U> as Codec>::Encoder>;
    type Decoder = <ProstCodec<T, U> as Codec>::Decoder;

    fn encoder(&mut self) -> Self::Encoder {
        AbortableEncoder(self.inner.encoder())
    }

    fn decoder(&mut self) -> Self::Decoder {
        self.inner.decoder()
    }
}

/// Encodes `Ok` items with the wrapped encoder and fails on `Err`
#[derive(Debug, Clone)]
pub struct AbortableEncoder<E>(E);

impl<E> Encoder for AbortableEncoder<E>
where
    E: Encoder<Error = Status>,
{
    type Item = Result<E::Item, Status>;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        self.0.encode(item?, dst)
    }
}

