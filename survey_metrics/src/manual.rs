/*!

This is the long-form manual for `survey_metrics` and `surveydash`.

## Surveys

Two household surveys are supported:
* `infrastructure` a socioeconomic and urban infrastructure survey (sanitation,
  dwelling, services)
* `energy` a customer satisfaction survey of an electric utility (income,
  electricity bill, quality ratings)

Both are read from a table with one row per respondent and one column per
question. The columns are the question texts, as exported by the survey tool.

## Input formats

* `csv` UTF-8 delimited text with a header row. A leading byte order mark is
  ignored. Rows may have fewer cells than the header.
* `xlsx` Excel spreadsheet. The first row of the worksheet is the header. When
  the workbook has several worksheets, the one to read must be named.

The format is guessed from the file extension when it is not given.

## Schema

All the computations refer to semantic fields (`bathrooms`, `monthly_income`,
`overall_satisfaction`, ...). A schema says in which column each field is
found. The default schemas carry the exact question texts of the
questionnaires. A column can be referenced:
* `exact` by its full header text
* `contains` by a fragment of the header, compared without case
* `firstOf` by a list of references, the first that matches wins

When a table lacks several of the columns needed by the requested metrics,
the error lists all of them at once.

## Derived metrics

### Counters

`bathrooms`, `showers`, `faucets` and `storage_liters` are read from free-text
answers such as `"2 banheiros"` or `"1000 litros"`: the first run of digits is
the value.

### `sanitation_index`

Each counter is divided by its maximum over the table and scaled to 2.5. The
index is the sum of the four terms and lies between 0 and 10.

### `vulnerability_score`

Sum of the weights of the conditions that hold:

| condition                                                         | weight |
|-------------------------------------------------------------------|--------|
| dwelling finish mentions `sem reboco`, `madeira`, `tijolo aparente` | 4      |
| education is `Não alfabetizado`                                   | 3      |
| occupation is `Desempregado`                                      | 3      |
| no bathroom                                                       | 3      |

A missing answer never triggers a condition.

### `per_capita_income`, `commitment_pct`

Monthly income divided by the household size, and the electricity bill as a
percentage of the income, rounded to two decimals (ties to even).

### `energy_poverty`

The household spends more than 10% of its income on electricity.

### `vulnerability_multi`

Number of criteria met among: per-capita income below 660, low education
(the answer mentions `não alfabetizado` or `fundamental`), energy poverty.

### Precomputed columns

Some exports already carry derived columns (`num_banheiros`,
`indice_saneamento`, `Renda Per Capita`, `Comprometimento (%)`, ...). When
such a column is present, it is used as is and the questions it derives from
are not required.

## Numeric policy

The default policy is lenient:
* a quantity answer without digits (or blank) counts as 0
* a ratio with a zero denominator is undefined for that row. Undefined values
  are left out of averages and never count as energy poverty.
* a counter that is zero everywhere contributes 0 to the sanitation index

The strict policy turns each of these cases into an error naming the row and
the column.

## Configuration file

The command line accepts a JSON configuration file. All the keys are
optional. Command-line flags take precedence.

```json
{
  "survey": "energy",
  "inputPath": "respostas.csv",
  "inputType": "csv",
  "columns": {
    "overall_satisfaction": { "contains": "satisfação geral" },
    "state": { "exact": "UF" }
  },
  "precomputed": { "per_capita_income": "Renda Per Capita" },
  "affirmativeLabel": "Sim",
  "numericPolicy": { "unparseableCount": "zero", "zeroDenominator": "lenient" },
  "energy": { "povertyThresholdPct": 10.0, "lowIncomePerCapita": 660.0 },
  "filters": { "state": ["SP", "RJ"] },
  "topN": 10
}
```

A relative `inputPath` is read relative to the configuration file.

## Reports

`surveydash` prints the dashboard of the survey as markdown tables. With
`--out`, the report is also written as JSON. With `--reference`, the JSON
report is compared to a reference file and the differences are printed.
*/
