use std::sync::Arc;
use std::thread;

use rand::Rng;
use stria::{Region, StmError, Transaction};

fn write_word(tx: &mut Transaction<'_>, addr: *mut u8, value: u64) -> Result<(), StmError> {
    unsafe { tx.write(value.to_ne_bytes().as_ptr(), 8, addr) }
}

fn read_word(tx: &mut Transaction<'_>, addr: *const u8) -> Result<u64, StmError> {
    let mut buf = [0u8; 8];
    unsafe { tx.read(addr, 8, buf.as_mut_ptr())? };
    Ok(u64::from_ne_bytes(buf))
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_counter() {
    let region = Arc::new(Region::new(8, 8).unwrap());
    let base = region.start() as usize;

    let threads = 8;
    let increments = 200u64;

    let mut handles = vec![];
    for _ in 0..threads {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let word = base as *mut u8;
            for _ in 0..increments {
                region.transact(false, |tx| {
                    let value = read_word(tx, word)?;
                    write_word(tx, word, value + 1)
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total = region.transact(true, |tx| read_word(tx, base as *const u8));
    assert_eq!(total, threads as u64 * increments);
}

#[test]
#[cfg_attr(miri, ignore)]
fn bank_conservation() {
    const ACCOUNTS: usize = 10;

    let region = Arc::new(Region::new(ACCOUNTS * 8, 8).unwrap());
    let base = region.start() as usize;

    {
        let mut tx = region.begin(false);
        for account in 0..ACCOUNTS {
            write_word(&mut tx, (base + account * 8) as *mut u8, 1000).unwrap();
        }
        tx.commit().unwrap();
    }

    let threads = 4;
    let transfers = 200;

    let mut handles = vec![];
    for _ in 0..threads {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..transfers {
                let from = rng.random_range(0..ACCOUNTS);
                let mut to = rng.random_range(0..ACCOUNTS);
                if to == from {
                    to = (to + 1) % ACCOUNTS;
                }

                region.transact(false, |tx| {
                    let from_ptr = (base + from * 8) as *mut u8;
                    let to_ptr = (base + to * 8) as *mut u8;

                    let from_balance = read_word(tx, from_ptr)?;
                    let to_balance = read_word(tx, to_ptr)?;
                    if from_balance >= 1 {
                        write_word(tx, from_ptr, from_balance - 1)?;
                        write_word(tx, to_ptr, to_balance + 1)?;
                    }
                    Ok(())
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total = region.transact(true, |tx| {
        let mut sum = 0;
        for account in 0..ACCOUNTS {
            sum += read_word(tx, (base + account * 8) as *const u8)?;
        }
        Ok(sum)
    });
    assert_eq!(total, ACCOUNTS as u64 * 1000, "money not conserved");
}

#[test]
#[cfg_attr(miri, ignore)]
fn aliased_stripes_never_lose_updates() {
    // The two words sit LOCK_TABLE_LEN bytes apart and therefore share a
    // stripe. Writers on distinct words contend on that stripe yet every
    // increment must survive.
    let region = Arc::new(Region::new(stria::LOCK_TABLE_LEN * 2, 8).unwrap());
    let base = region.start() as usize;

    let rounds = 300u64;

    let mut handles = vec![];
    for owner in 0..2usize {
        let region = region.clone();
        handles.push(thread::spawn(move || {
            let word = (base + owner * stria::LOCK_TABLE_LEN) as *mut u8;
            for _ in 0..rounds {
                region.transact(false, |tx| {
                    let value = read_word(tx, word)?;
                    write_word(tx, word, value + 1)
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for owner in 0..2usize {
        let word = (base + owner * stria::LOCK_TABLE_LEN) as *const u8;
        let value = region.transact(true, |tx| read_word(tx, word));
        assert_eq!(value, rounds);
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn read_only_snapshots_are_consistent() {
    let region = Arc::new(Region::new(16, 8).unwrap());
    let base = region.start() as usize;

    // The writer keeps both words equal in every committed state; a
    // reader observing a mixed pair would be a torn snapshot.
    let writer = {
        let region = region.clone();
        thread::spawn(move || {
            for n in 1..=500u64 {
                region.transact(false, |tx| {
                    write_word(tx, base as *mut u8, n)?;
                    write_word(tx, (base + 8) as *mut u8, n)
                });
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let region = region.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let (a, b) = region.transact(true, |tx| {
                        let a = read_word(tx, base as *const u8)?;
                        let b = read_word(tx, (base + 8) as *const u8)?;
                        Ok((a, b))
                    });
                    assert_eq!(a, b, "torn snapshot: {a} != {b}");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
