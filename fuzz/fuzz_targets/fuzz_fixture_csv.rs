#![no_main]

use libfuzzer_sys::fuzz_target;
use mx_fixture::Matrix;

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let dim = usize::from(first % 8) + 1;

    let mut values = rest.iter().map(|&b| i64::from(b as i8)).cycle();
    let cells = (0..dim)
        .map(|_| (0..dim).map(|_| values.next().unwrap_or(0)).collect())
        .collect();

    let matrix = Matrix::from_rows(cells).expect("square by construction");
    let body = matrix.to_csv_string().expect("csv");
    assert_eq!(body.lines().count(), dim);
    for line in body.lines() {
        assert_eq!(line.split(',').count(), dim);
        assert!(line.split(',').all(|field| field.parse::<i64>().is_ok()));
    }
});
