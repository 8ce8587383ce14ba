//! Big-integer helpers shared by key generation, encryption and the homomorphic operations

use num_bigint::{BigInt, BigUint, RandBigInt, ToBigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;

/// Odd primes below 256, used to reject most candidates before Miller-Rabin.
const SMALL_PRIMES: [u32; 53] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// Modular exponentiation: base^exp mod modulus
pub fn mod_exp(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// Modular inverse of `a` modulo `m`, if `gcd(a, m) = 1`
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }

    let a = BigInt::from(a.clone());
    let m = BigInt::from(m.clone());
    let egcd = a.extended_gcd(&m);

    if !egcd.gcd.is_one() {
        return None;
    }

    egcd.x.mod_floor(&m).to_biguint()
}

/// Paillier's `L(x) = (x - 1) / n`, integer division
pub fn l_function(x: &BigUint, n: &BigUint) -> BigUint {
    if x.is_zero() {
        return BigUint::zero();
    }
    (x - BigUint::one()) / n
}

/// Carmichael function of `n = p * q`: `lcm(p - 1, q - 1)`
pub fn carmichael_lambda(p: &BigUint, q: &BigUint) -> BigUint {
    let p_minus_1 = p - BigUint::one();
    let q_minus_1 = q - BigUint::one();
    p_minus_1.lcm(&q_minus_1)
}

/// Draw a uniformly random integer of at most `bits` bits.
pub fn random_bits<R: RngCore + ?Sized>(
    bits: u64,
    rng: &mut R,
) -> std::result::Result<BigUint, rand::Error> {
    if bits == 0 {
        return Ok(BigUint::zero());
    }

    let byte_len = bits.div_ceil(8) as usize;
    let mut buf = vec![0u8; byte_len];
    rng.try_fill_bytes(&mut buf)?;

    let excess = (byte_len as u64) * 8 - bits;
    if excess > 0 {
        buf[0] &= 0xffu8 >> excess;
    }

    Ok(BigUint::from_bytes_be(&buf))
}

/// Draw a uniformly random integer in `[0, bound)` by rejection sampling.
pub fn random_below<R: RngCore + ?Sized>(
    bound: &BigUint,
    rng: &mut R,
) -> std::result::Result<BigUint, rand::Error> {
    let bits = bound.bits();
    loop {
        let candidate = random_bits(bits, rng)?;
        if &candidate < bound {
            return Ok(candidate);
        }
    }
}

/// Draw a random `r` in `[1, n)` with `gcd(r, n) = 1`.
pub fn random_coprime<R: RngCore + ?Sized>(
    n: &BigUint,
    rng: &mut R,
) -> std::result::Result<BigUint, rand::Error> {
    loop {
        let r = random_below(n, rng)?;
        if !r.is_zero() && r.gcd(n).is_one() {
            return Ok(r);
        }
    }
}

/// Miller-Rabin primality test with `rounds` random witnesses, preceded by trial division.
pub fn is_probable_prime<R: RngCore + ?Sized>(n: &BigUint, rounds: usize, rng: &mut R) -> bool {
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    if n == &two {
        return true;
    }
    if n.is_even() {
        return false;
    }

    for &small in SMALL_PRIMES.iter() {
        let small = BigUint::from(small);
        if n == &small {
            return true;
        }
        if (n % &small).is_zero() {
            return false;
        }
    }

    let n_minus_1 = n - BigUint::one();
    let (s, d) = factor_powers_of_two(&n_minus_1);

    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_1);
        let mut x = mod_exp(&a, &d, n);

        if x.is_one() || x == n_minus_1 {
            continue;
        }

        for _ in 1..s {
            x = mod_exp(&x, &two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// Write `n` as `2^s * d` with `d` odd.
pub fn factor_powers_of_two(n: &BigUint) -> (u64, BigUint) {
    match n.trailing_zeros() {
        Some(s) => (s, n >> s),
        None => (0, BigUint::zero()),
    }
}

/// Generate a prime of exactly `bits` bits whose two top bits are set, so that the
/// product of two such primes has exactly `2 * bits` bits.
pub fn generate_prime<R: RngCore + ?Sized>(
    bits: u64,
    rounds: usize,
    max_attempts: u64,
    rng: &mut R,
) -> std::result::Result<Option<BigUint>, rand::Error> {
    if bits < 3 {
        return Ok(None);
    }

    let top_bits = (BigUint::one() << (bits - 1)) | (BigUint::one() << (bits - 2));

    for _ in 0..max_attempts {
        let mut candidate = random_bits(bits, rng)?;
        candidate |= &top_bits;
        candidate |= BigUint::one();

        if is_probable_prime(&candidate, rounds, rng) {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}
