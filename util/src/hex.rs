// Copyright 2018 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Simple hex encode/decode helpers used for logging and wire debugging.

/// Encode bytes as a lowercase hex string.
pub fn to_hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() * 2);
	for b in bytes {
		s.push_str(&format!("{:02x}", b));
	}
	s
}

/// Decode a hex string into bytes. Fails on odd length or non-hex digits.
pub fn from_hex(hex: &str) -> Result<Vec<u8>, String> {
	if hex.len() % 2 != 0 {
		return Err("hex string has odd length".to_string());
	}
	(0..hex.len())
		.step_by(2)
		.map(|i| {
			u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("invalid hex digit: {}", e))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let bytes = vec![0u8, 1, 255, 16, 128];
		assert_eq!(from_hex(&to_hex(&bytes)).unwrap(), bytes);
	}

	#[test]
	fn rejects_odd_length() {
		assert!(from_hex("abc").is_err());
	}
}
